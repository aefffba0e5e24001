//! JSON read API over the cache.

mod error;
mod handlers;
mod routes;

pub use error::ErrorResponse;
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::CacheService;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CacheService>,
}

impl AppState {
    pub fn new(service: Arc<CacheService>) -> Self {
        Self { service }
    }
}

/// Bind `bind_addr` and serve until the process exits.
pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| AppError::Config(format!("invalid bind_addr '{}': {}", bind_addr, e)))?;
    let app = create_router(state);

    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
