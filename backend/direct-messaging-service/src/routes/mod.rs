use crate::services::uploads::MAX_CHUNK_SIZE;
use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use serde_json::json;

pub mod conversations;
pub mod keys;
pub mod presence;
pub mod uploads;
pub mod wsroute;

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "onlineUsers": state.registry.online_count(),
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_CHUNK_SIZE))
        .service(health)
        .service(wsroute::ws_handler)
        .service(conversations::list_conversations)
        .service(conversations::get_thread)
        .service(presence::get_presence)
        .service(keys::publish_key)
        .service(keys::get_key)
        .service(keys::revoke_key)
        .service(uploads::start_upload)
        .service(uploads::put_chunk)
        .service(uploads::upload_status)
        .service(uploads::complete_upload);
}
