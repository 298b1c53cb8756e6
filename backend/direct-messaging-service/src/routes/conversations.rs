use crate::error::AppError;
use crate::middleware::User;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    pub limit: Option<usize>,
}

/// One entry per counterpart, most recent first.
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let summaries = state.lifecycle.summaries(user.id).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

#[get("/conversations/{counterpart_id}/messages")]
pub async fn get_thread(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<ThreadQuery>,
) -> Result<HttpResponse, AppError> {
    let counterpart_id = path.into_inner();
    let messages = state
        .lifecycle
        .thread(user.id, counterpart_id, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}
