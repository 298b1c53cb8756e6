use crate::error::AppError;
use crate::middleware::User;
use crate::state::AppState;
use actix_web::{delete, get, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishKeyRequest {
    pub public_key: String,
}

#[put("/keys")]
pub async fn publish_key(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<PublishKeyRequest>,
) -> Result<HttpResponse, AppError> {
    let published = state.keys.publish(user.id, &body.public_key)?;
    Ok(HttpResponse::Ok().json(published))
}

#[get("/keys/{user_id}")]
pub async fn get_key(
    state: web::Data<AppState>,
    _user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let key = state.keys.get(path.into_inner()).ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(key))
}

/// Withdraws the caller's key, e.g. on logout.
#[delete("/keys")]
pub async fn revoke_key(state: web::Data<AppState>, user: User) -> Result<HttpResponse, AppError> {
    state.keys.revoke(user.id);
    Ok(HttpResponse::NoContent().finish())
}
