//! switchboard-api: HTTP and WebSocket surface of the relay.
//!
//! Two listeners:
//!   - page endpoint: landing page at `/`, JSON status under `/api`
//!   - signal endpoint: WebSocket upgrade with `?peerId=<id>`, any path
//!
//! Both are served over TLS unless the daemon runs with TLS disabled.

pub mod handlers;
pub mod tls;

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;
pub use tls::{load_server_config, Tls, TlsError, TlsListener};

/// Routes for the page endpoint.
pub fn page_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new().route("/peers", get(handlers::handle_peers));

    Router::new()
        .route("/", get(handlers::handle_home))
        .nest("/api", api_routes)
        .fallback(handlers::handle_not_found)
        .layer(cors)
        .with_state(state)
}

/// Routes for the signaling endpoint. Every path accepts the upgrade.
pub fn signal_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::handle_signal))
        .fallback(handlers::handle_signal)
        .with_state(state)
}

/// Serve `app` on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    tls: Option<Tls>,
    app: Router,
    name: &'static str,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    match tls {
        Some(tls) => {
            tracing::info!(%addr, endpoint = name, "listening (tls)");
            let listener = TlsListener::new(listener, tls)?;
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
        None => {
            tracing::warn!(%addr, endpoint = name, "listening without TLS");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await?;
        }
    }
    tracing::info!(endpoint = name, "stopped");
    Ok(())
}
