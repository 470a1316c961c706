//! Connection handlers for the Courier server.
//!
//! This module owns the HTTP surface (two WebSocket endpoints plus a
//! health check) and the per-connection read/write loops. Session
//! lifecycle rules live in `session`; everything here is socket glue.

use crate::auth::{Authenticator, StoreAuthenticator, UserIdentity};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::session::{ChatSession, PresenceSession};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use courier_core::event::RoomEvent;
use courier_core::gateway::Gateway;
use courier_core::presence::PresenceRegistry;
use courier_core::registry::RoomRegistry;
use courier_protocol::codec;
use courier_store::SqliteStore;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Per-conversation room registry.
    pub registry: Arc<RoomRegistry>,
    /// Process-wide presence group.
    pub presence: Arc<PresenceRegistry>,
    /// Durable store.
    pub store: SqliteStore,
    /// Persistence gateway handle for sessions.
    pub gateway: Arc<dyn Gateway>,
    /// Handshake identity resolution.
    pub auth: Arc<dyn Authenticator>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state around a connected store.
    #[must_use]
    pub fn new(config: Config, store: SqliteStore) -> Self {
        let gateway: Arc<dyn Gateway> = Arc::new(store.clone());
        let registry = Arc::new(RoomRegistry::with_capacity(config.limits.room_capacity));
        let presence = Arc::new(PresenceRegistry::with_capacity(
            gateway.clone(),
            config.limits.presence_capacity,
        ));
        let auth = Arc::new(StoreAuthenticator::new(store.clone()));

        Self {
            registry,
            presence,
            store,
            gateway,
            auth,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the store connection or server startup fails.
pub async fn run_server(config: Config) -> Result<()> {
    let store = SqliteStore::connect(
        &config.database.url,
        config.database.max_connections,
    )
    .await?;

    let state = Arc::new(AppState::new(config.clone(), store));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = router(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Courier server listening on {}", addr);
    info!("Chat endpoint: ws://{}/ws/chat/{{user_id}}", addr);
    info!("Presence endpoint: ws://{}/ws/status", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the axum router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws/chat/:user_id", get(chat_ws_handler))
        .route("/ws/status", get(presence_ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
struct AuthQuery {
    token: Option<String>,
}

/// Chat endpoint upgrade handler.
///
/// An unauthenticated handshake is rejected before the upgrade: the
/// client sees 401 and no frame is ever sent.
async fn chat_ws_handler(
    Path(peer_id): Path<i64>,
    Query(query): Query<AuthQuery>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(identity) = state.auth.authenticate(query.token.as_deref()).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_chat(socket, state, identity, peer_id))
        .into_response()
}

/// Presence endpoint upgrade handler.
async fn presence_ws_handler(
    Query(query): Query<AuthQuery>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(identity) = state.auth.authenticate(query.token.as_deref()).await else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_presence(socket, state, identity))
        .into_response()
}

/// Serve one chat connection for its whole lifetime.
async fn handle_chat(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: UserIdentity,
    peer_id: i64,
) {
    let _metrics_guard = ConnectionMetricsGuard::new("chat");

    let (mut session, mut events) = ChatSession::open(
        state.registry.clone(),
        state.presence.clone(),
        state.gateway.clone(),
        identity,
        peer_id,
    )
    .await;
    metrics::set_active_rooms(state.registry.room_count());

    let (mut sink, mut stream) = socket.split();

    // An inbound frame is fully handled, persistence and fan-out
    // included, before the next frame is read: per-session, per-event
    // ordering.
    loop {
        tokio::select! {
            biased;

            event = events.recv() => {
                if !forward_event(&mut sink, event, |e| session.outbound(e)).await {
                    break;
                }
            }

            msg = stream.next() => {
                match read_frame(&mut sink, msg, &state, session.connection().as_str()).await {
                    ReadOutcome::Frame(text) => {
                        if let Err(e) = session.handle_frame(&text).await {
                            // Single frame dropped; the connection and the
                            // rest of the room are unaffected.
                            warn!(
                                connection = %session.connection(),
                                error = %e,
                                "Frame dropped"
                            );
                            metrics::record_error(e.label());
                        }
                    }
                    ReadOutcome::Ignored => {}
                    ReadOutcome::Closed => break,
                }
            }
        }
    }

    // Teardown runs for voluntary close and transport failure alike.
    drop(events);
    session.close().await;
    metrics::set_active_rooms(state.registry.room_count());
}

/// Serve one presence connection for its whole lifetime.
async fn handle_presence(socket: WebSocket, state: Arc<AppState>, identity: UserIdentity) {
    let _metrics_guard = ConnectionMetricsGuard::new("presence");

    let (mut session, mut events) =
        PresenceSession::open(state.presence.clone(), identity).await;

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;

            event = events.recv() => {
                if !forward_event(&mut sink, event, |e| session.outbound(e)).await {
                    break;
                }
            }

            msg = stream.next() => {
                match read_frame(&mut sink, msg, &state, session.connection().as_str()).await {
                    // This channel is output-only: inbound application
                    // data is ignored.
                    ReadOutcome::Frame(_) | ReadOutcome::Ignored => {}
                    ReadOutcome::Closed => break,
                }
            }
        }
    }

    drop(events);
    session.close().await;
}

/// Encode and write one broadcast event to the socket.
///
/// Returns `false` when the loop should stop (socket gone or the
/// registry side closed).
async fn forward_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: Result<Arc<RoomEvent>, broadcast::error::RecvError>,
    outbound: impl Fn(&RoomEvent) -> Option<courier_protocol::ServerFrame>,
) -> bool {
    match event {
        Ok(event) => {
            let Some(frame) = outbound(&event) else {
                return true;
            };
            match codec::encode(&frame) {
                Ok(text) => {
                    metrics::record_frame("outbound");
                    sink.send(Message::Text(text)).await.is_ok()
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode outbound frame");
                    metrics::record_error("encode");
                    true
                }
            }
        }
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "Slow consumer; broadcast events dropped");
            metrics::record_error("lagged");
            true
        }
        Err(broadcast::error::RecvError::Closed) => false,
    }
}

/// Outcome of reading one WebSocket message.
enum ReadOutcome {
    /// An application text frame to hand to the session.
    Frame(String),
    /// Transport chatter (ping/pong/binary); nothing to do.
    Ignored,
    /// The connection is gone, voluntarily or not.
    Closed,
}

/// Read one message off the socket, answering pings and enforcing the
/// frame size limit.
async fn read_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: Option<Result<Message, axum::Error>>,
    state: &AppState,
    connection: &str,
) -> ReadOutcome {
    match msg {
        Some(Ok(Message::Text(text))) => {
            metrics::record_frame("inbound");
            if text.len() > state.config.limits.max_frame_size {
                warn!(connection, size = text.len(), "Oversized frame dropped");
                metrics::record_error("frame_too_large");
                return ReadOutcome::Ignored;
            }
            ReadOutcome::Frame(text)
        }
        Some(Ok(Message::Binary(_))) => {
            // JSON text protocol; binary frames carry nothing.
            ReadOutcome::Ignored
        }
        Some(Ok(Message::Ping(data))) => {
            if sink.send(Message::Pong(data)).await.is_err() {
                return ReadOutcome::Closed;
            }
            ReadOutcome::Ignored
        }
        Some(Ok(Message::Pong(_))) => ReadOutcome::Ignored,
        Some(Ok(Message::Close(_))) => {
            debug!(connection, "Received close frame");
            ReadOutcome::Closed
        }
        Some(Err(e)) => {
            warn!(connection, error = %e, "WebSocket error");
            metrics::record_error("websocket");
            ReadOutcome::Closed
        }
        None => {
            debug!(connection, "WebSocket stream ended");
            ReadOutcome::Closed
        }
    }
}
