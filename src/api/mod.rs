//! Read-only REST API over the snapshot cache
//!
//! Handlers read the latest complete snapshot through the [`SnapshotStore`]
//! and never wait for a running cycle. Only the alert state goes through the
//! scheduler actor.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/targets` - Every target with status and severity
//! - `GET /api/v1/targets/:id` - A single target
//! - `GET /api/v1/public/targets` - Public status list (no ids or errors)
//! - `GET /api/v1/alerts` - Alert deduplication state
//!
//! [`SnapshotStore`]: crate::cache::SnapshotStore

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{AlertsResponse, HealthResponse, PublicTarget, TargetView, TargetsResponse};

#[cfg(feature = "api")]
use std::net::SocketAddr;

#[cfg(feature = "api")]
use axum::{Router, routing::get};
#[cfg(feature = "api")]
use tracing::info;

#[cfg(feature = "api")]
use crate::config::ApiConfig;

/// Build the router without binding it.
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut protected = Router::new()
        .route("/api/v1/targets", get(routes::targets::list_targets))
        .route("/api/v1/targets/:id", get(routes::targets::get_target))
        .route("/api/v1/alerts", get(routes::alerts::alert_state));

    if let Some(token) = config.auth_token.clone() {
        protected = protected.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/public/targets",
            get(routes::targets::list_public_targets),
        )
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
