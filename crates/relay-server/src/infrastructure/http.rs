//! HTTP front door: chat WebSocket, user listing and static files.
//!
//! | Route        | Handler                                          |
//! |--------------|--------------------------------------------------|
//! | `GET /chat`  | WebSocket upgrade, one relay session per socket  |
//! | `GET /users` | plain-text user listing (names only)             |
//! | `GET /`      | `<web_root>/index.html`                          |
//! | `/static/*`  | files under `<web_root>/static`                  |
//!
//! The server stops accepting once the relay's shutdown coordinator has
//! finished closing every session.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};

use relay_core::Relay;

use crate::domain::config::RelayConfig;
use crate::infrastructure::ws_connection::split_socket;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until the relay shuts down.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound (port in use, missing
/// privileges for port 80) or the server fails while running.
pub async fn run_server(config: &RelayConfig, relay: Arc<Relay>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;
    let local = listener
        .local_addr()
        .context("failed to read bound address")?;

    relay.log(&format!("Listening on: {local}"));
    info!("relay listening on {local}");

    serve(listener, relay, &config.web_root).await
}

/// Serves the router on an already bound listener.
///
/// Split out from [`run_server`] so tests can bind port 0 themselves.
pub async fn serve(listener: TcpListener, relay: Arc<Relay>, web_root: &Path) -> anyhow::Result<()> {
    let app = build_router(Arc::clone(&relay), web_root);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { relay.shutdown().stopped().await })
    .await
    .context("HTTP server terminated with an error")?;

    info!("HTTP server stopped");
    Ok(())
}

pub fn build_router(relay: Arc<Relay>, web_root: &Path) -> Router {
    Router::new()
        .route("/chat", get(chat_upgrade))
        .route("/users", get(users))
        .route_service("/", ServeFile::new(web_root.join("index.html")))
        .nest_service("/static", ServeDir::new(web_root.join("static")))
        .with_state(relay)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn chat_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(relay): State<Arc<Relay>>,
) -> Response {
    debug!("WebSocket upgrade from {remote}");
    ws.on_upgrade(move |socket| run_session(relay, remote, socket))
}

async fn run_session(relay: Arc<Relay>, remote: SocketAddr, socket: WebSocket) {
    let (sink, source) = split_socket(socket);
    match relay.serve_session(remote.ip(), Arc::new(sink), source).await {
        Ok(summary) => debug!(
            "session {} from {remote} finished after {} frames ({:?})",
            summary.id, summary.message_count, summary.cause
        ),
        Err(e) => warn!("session from {remote} could not start: {e}"),
    }
}

async fn users(State(relay): State<Arc<Relay>>) -> String {
    let mut listing = relay.list_users(false).await;
    listing.push('\n');
    listing
}
