use super::dispatcher::EventDispatcher;
use super::TransportId;
use crate::services::PresenceTracker;
use actix::{
    Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler, WeakAddr,
};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

// Reply for the transport that sent the request
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Reply(String);

/// One authenticated socket. Lives exactly as long as its transport.
pub struct WsSession {
    user_id: Uuid,
    transport_id: TransportId,
    presence: PresenceTracker,
    dispatcher: Arc<EventDispatcher>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    // Inbound text frames, handled one at a time in arrival order.
    frames: Option<UnboundedSender<String>>,
}

impl WsSession {
    pub fn new(
        user_id: Uuid,
        presence: PresenceTracker,
        dispatcher: Arc<EventDispatcher>,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        Self {
            user_id,
            transport_id: TransportId::new(),
            presence,
            dispatcher,
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
            frames: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.hb) > act.client_timeout {
                tracing::warn!(user_id = %act.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Detached worker for this transport's frames. Frames already queued
    /// run to completion after the socket closes; their replies are dropped.
    fn spawn_frame_worker(&self, frames: UnboundedReceiver<String>, addr: WeakAddr<Self>) {
        let dispatcher = self.dispatcher.clone();
        let user_id = self.user_id;
        let transport_id = self.transport_id;

        actix::spawn(async move {
            dispatcher
                .drain_frames(user_id, transport_id, frames, |reply| {
                    match (reply.to_json(), addr.upgrade()) {
                        (Ok(payload), Some(addr)) => addr.do_send(Reply(payload)),
                        (Ok(_), None) => {}
                        (Err(e), _) => tracing::error!(error = %e, "failed to encode reply"),
                    }
                })
                .await;
        });
    }

    fn dispatch(&self, text: String) {
        let Some(frames) = &self.frames else {
            return;
        };
        if frames.send(text).is_err() {
            tracing::warn!(user_id = %self.user_id, "frame worker gone, dropping frame");
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, transport_id = %self.transport_id, "WebSocket session started");

        self.hb(ctx);

        let (frame_tx, frame_rx) = unbounded_channel();
        self.spawn_frame_worker(frame_rx, ctx.address().downgrade());
        self.frames = Some(frame_tx);

        let (tx, rx) = unbounded_channel();
        // Frames fanned out through the registry.
        ctx.add_stream(UnboundedReceiverStream::new(rx));

        if let Some(record) = self.presence.attach(self.user_id, self.transport_id, tx) {
            let presence = self.presence.clone();
            actix::spawn(async move { presence.persist(&record).await });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, transport_id = %self.transport_id, "WebSocket session stopped");
        self.frames = None;

        let removal = self.presence.detach(self.user_id, self.transport_id);
        if let Some(record) = removal.went_offline {
            let presence = self.presence.clone();
            actix::spawn(async move { presence.persist(&record).await });
        }
    }
}

impl Handler<Reply> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Reply, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<String> for WsSession {
    fn handle(&mut self, payload: String, ctx: &mut Self::Context) {
        ctx.text(payload);
    }

    // The registry drops the sender only after this session stopped.
    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.dispatch(text.to_string());
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(user_id = %self.user_id, "Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(user_id = %self.user_id, ?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                tracing::warn!(user_id = %self.user_id, "fragmented frames not supported");
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
