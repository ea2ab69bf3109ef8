use axum::{Extension, Router, routing::get};
use std::{future::Future, net::SocketAddr, str::FromStr};

use crate::{
    api,
    error::{Result, SessionError},
    session::SessionManager,
};

/// Routes of the local login listener.
pub fn router(manager: SessionManager) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/callback", get(api::callback))
        .route("/dashboard", get(api::callback))
        .layer(Extension(manager))
}

/// Serve the login listener on `addr` until `shutdown` resolves.
pub async fn start_api_server<F>(manager: SessionManager, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from_str(addr)
        .map_err(|e| SessionError::Config(format!("Failed to parse server address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SessionError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::debug!("Login listener on {}", addr);

    axum::serve(listener, router(manager))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))
}
