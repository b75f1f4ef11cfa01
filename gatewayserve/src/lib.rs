//! HTTP + SSE surface for the assistant gateway: chats, agent turns, cron
//! control, model/env administration, and the QQ inbound webhook.
//!
//! `gatewaycli` builds an [`app::AppState`] (wiring the `gateway_core`
//! orchestrator, store, and scheduler) and calls [`run_serve`] or
//! [`run_serve_on_listener`] to start accepting connections.

mod app;
mod middleware;
mod response;
mod routes;

pub use app::{router, AppState};
pub use response::ApiError;

use std::net::SocketAddr;
use std::sync::Arc;

/// Binds `addr` and serves forever. Returns once the server stops (normally
/// only on a fatal listener error, since the router never exits on its own).
pub async fn run_serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}

/// Serves on an already-bound listener — used by tests that need an
/// ephemeral port (`127.0.0.1:0`) and by callers that set up the socket
/// themselves (e.g. systemd socket activation).
pub async fn run_serve_on_listener(listener: tokio::net::TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let app = router(state);
    axum::serve(listener, app).await
}
