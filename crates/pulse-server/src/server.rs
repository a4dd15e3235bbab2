//! Axum router and per-socket read/write loops.
//!
//! The WebSocket endpoint is the identity path itself: a client connects
//! to `/<name>` and the path (with leading/trailing separators stripped)
//! becomes its user identity. A connection with no derivable identity is
//! rejected with 400 before the upgrade — a blank identity is never
//! registered.

use std::sync::Arc;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::debug;

use pulse_store::QuizStore;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::websocket::connection::OUTBOUND_BUFFER;
use crate::websocket::dispatch::CommandDispatcher;
use crate::websocket::lifecycle::ConnectionLifecycle;
use crate::websocket::registry::SessionRegistry;

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    lifecycle: Arc<ConnectionLifecycle>,
    dispatcher: Arc<CommandDispatcher>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire the handlers over one registry and one store.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn QuizStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            lifecycle: Arc::new(ConnectionLifecycle::new(
                Arc::clone(&registry),
                Arc::clone(&store),
            )),
            dispatcher: Arc::new(CommandDispatcher::new(registry, store)),
            metrics,
        }
    }
}

/// Build the relay router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/", get(missing_identity))
        .route("/{*identity}", get(ws_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn missing_identity() -> StatusCode {
    StatusCode::BAD_REQUEST
}

/// A connection path that yields no user identity.
///
/// Such connections are rejected before the upgrade; a blank identity is
/// never registered.
#[derive(Debug, Error)]
#[error("connection path `{path}` has no derivable user identity")]
pub struct UnknownIdentity {
    /// The offending raw path.
    path: String,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(identity): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match normalize_identity(&identity) {
        Ok(user_name) => ws.on_upgrade(move |socket| serve_socket(state, user_name, socket)),
        Err(error) => {
            debug!(%error, "rejecting connection");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Derive the user identity from the request path: strip separators and
/// surrounding whitespace, reject what's left if empty.
fn normalize_identity(raw: &str) -> Result<String, UnknownIdentity> {
    let name = raw.trim().trim_matches('/').trim();
    if name.is_empty() {
        Err(UnknownIdentity {
            path: raw.to_owned(),
        })
    } else {
        Ok(name.to_owned())
    }
}

/// Drive one upgraded socket until it closes.
async fn serve_socket(state: AppState, user_name: String, socket: WebSocket) {
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: drain the outbound queue into the socket. Everything
    // queued for this connection goes through here, in order.
    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound_rx.recv().await {
            let frame = Message::Text(payload.as_str().to_owned().into());
            if ws_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    let connection = state.lifecycle.on_connect(&user_name, outbound_tx).await;

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => state.dispatcher.handle(&connection, text.as_str()).await,
            Ok(Message::Close(_)) | Err(_) => break,
            // Binary frames and protocol ping/pong carry no commands.
            Ok(_) => {}
        }
    }

    state.lifecycle.on_disconnect(&connection).await;
    // A closed connection's pending sends are dropped, never retried.
    writer.abort();

    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
}
