//! HTTP surface for conversation generation.

mod dto;
mod handlers;
mod routes;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;

use crate::error::DialogenError;
use crate::orchestrator::JobOrchestrator;

pub use dto::SyncResponse;
pub use handlers::AppState;
pub use routes::router;

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(addr: SocketAddr, orchestrator: JobOrchestrator) -> Result<(), DialogenError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| DialogenError::Server(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "listening");
    axum::serve(listener, router(AppState::new(orchestrator))).await?;
    Ok(())
}
