pub mod error;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::get_health))
        .route("/config/{collector}", get(routes::config::check_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on a pre-bound listener until `cancel` fires.
///
/// In-flight requests get up to `drain` to finish after cancellation; the
/// server is abandoned after that.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
    drain: Duration,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "http server listening");

    let shutdown = cancel.clone();
    let server = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        res = &mut server => res?,
        _ = cancel.cancelled() => {
            match tokio::time::timeout(drain, &mut server).await {
                Ok(res) => res?,
                Err(_) => tracing::warn!(?drain, "http server did not drain in time"),
            }
        }
    }

    tracing::info!("http server stopped");
    Ok(())
}
