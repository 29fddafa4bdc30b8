pub mod health;
pub mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::runner::JobRunner;

/// HTTP server state shared across all handlers
#[derive(Clone, Debug)]
pub struct HttpState {
    pub runner: Arc<JobRunner>,
    pub service_start_time: std::time::Instant,
}

impl HttpState {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            service_start_time: std::time::Instant::now(),
        }
    }
}

/// Create the HTTP router, serving job output on `metrics_path`
pub fn create_router(state: HttpState, metrics_path: &str) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(metrics_path, get(metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `addr` until `shutdown` resolves
pub async fn run_http_server<F>(
    addr: SocketAddr,
    router: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("Starting HTTP server on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
