//! Tank Session Server - authoritative tank-session simulation and replication
//!
//! - `game`: vehicles, seats, simulation, combat and the session tick task
//! - `replication`: field/event replication and observer shadow state
//! - `ws` / `http`: JSON WebSocket transport and HTTP routes

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod replication;
pub mod util;
pub mod ws;

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;

/// Serve the HTTP/WebSocket surface on `listener` until `shutdown` resolves,
/// then stop every session so observers are told the session ended.
pub async fn run(
    listener: TcpListener,
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = AppState::new(config);
    let sessions = state.sessions.clone();
    info!(session_id = %state.default_session, "Default session running");

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            sessions.shutdown_all();
        })
        .await?;

    Ok(())
}
