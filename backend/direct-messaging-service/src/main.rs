use actix_web::{middleware::Logger, web, App, HttpServer};
use direct_messaging_service::{
    config, error, logging,
    middleware::JwtIdentityVerifier,
    routes,
    state::{AppState, Stores},
};
use std::sync::Arc;
use std::time::Duration;

const UPLOAD_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    let cfg = Arc::new(config::Config::from_env()?);
    logging::init_tracing(cfg.log_format);

    let verifier = Arc::new(JwtIdentityVerifier::from_rsa_pem(&cfg.jwt_public_key_pem)?);
    let stores = Stores::from_config(&cfg).await?;
    let state = AppState::new(cfg.clone(), stores, verifier);

    let uploads = state.uploads.clone();
    let upload_ttl = cfg.upload.ttl;
    actix_web::rt::spawn(async move {
        let mut tick = tokio::time::interval(upload_ttl.min(UPLOAD_SWEEP_INTERVAL));
        loop {
            tick.tick().await;
            if let Err(e) = uploads.sweep_expired(upload_ttl).await {
                tracing::warn!(error = %e, "upload sweep failed");
            }
        }
    });

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting direct-messaging-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run server: {e}")))
}
