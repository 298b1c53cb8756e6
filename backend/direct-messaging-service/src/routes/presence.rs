use crate::error::AppError;
use crate::middleware::User;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use uuid::Uuid;

#[get("/users/{user_id}/presence")]
pub async fn get_presence(
    state: web::Data<AppState>,
    _user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let record = state.presence.presence(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}
