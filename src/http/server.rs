//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::enforce_rate_limit;
use super::routes;
use crate::error::Result;
use crate::ratelimit::RateLimitGate;

/// State shared with every handler and the gate middleware.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<RateLimitGate>,
    pub trust_forwarded_for: bool,
    pub started_at: Instant,
}

/// HTTP server fronting the site, with every route behind the rate limit gate.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server around a shared gate.
    pub fn new(addr: SocketAddr, gate: Arc<RateLimitGate>, trust_forwarded_for: bool) -> Self {
        Self {
            addr,
            state: AppState {
                gate,
                trust_forwarded_for,
                started_at: Instant::now(),
            },
        }
    }

    /// Build the router. The gate layer wraps the fallback too, so no
    /// request reaches a handler without passing it.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .fallback(routes::not_found)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                enforce_rate_limit,
            ))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        info!(addr = %listener.local_addr()?, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}
