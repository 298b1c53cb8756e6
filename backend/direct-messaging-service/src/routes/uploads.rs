use crate::error::AppError;
use crate::middleware::User;
use crate::services::StartUpload;
use crate::state::AppState;
use actix_web::{get, post, put, web, HttpResponse};
use uuid::Uuid;

#[post("/uploads")]
pub async fn start_upload(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<StartUpload>,
) -> Result<HttpResponse, AppError> {
    let status = state.uploads.start(user.id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(status))
}

/// Raw chunk bytes in the body.
#[put("/uploads/{file_id}/chunks/{index}")]
pub async fn put_chunk(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, u32)>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let (file_id, index) = path.into_inner();
    let status = state
        .uploads
        .accept_chunk(user.id, file_id, index, &body)
        .await?;
    Ok(HttpResponse::Ok().json(status))
}

/// What a resuming client calls to learn which chunks are still missing.
#[get("/uploads/{file_id}")]
pub async fn upload_status(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let status = state.uploads.status(user.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[post("/uploads/{file_id}/complete")]
pub async fn complete_upload(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let file = state.uploads.complete(user.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(file))
}
