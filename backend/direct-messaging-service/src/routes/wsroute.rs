use crate::error::AppError;
use crate::middleware::extract_credential;
use crate::state::AppState;
use crate::websocket::session::WsSession;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

/// Socket admission. A bad credential is refused before the upgrade and
/// leaves no trace in the registry.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let verified = extract_credential(&req)
        .ok_or(AppError::Unauthorized)
        .and_then(|credential| state.verifier.verify(&credential));

    let user_id = match verified {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!(peer = ?req.peer_addr(), "WebSocket admission refused");
            return Err(e.into());
        }
    };

    if let Err(e) = state.users.remember(user_id).await {
        tracing::warn!(%user_id, error = %e, "failed to record verified user");
    }

    let session = WsSession::new(
        user_id,
        state.presence.clone(),
        state.dispatcher.clone(),
        state.config.websocket.heartbeat_interval,
        state.config.websocket.client_timeout,
    );
    ws::start(session, &req, stream)
}
