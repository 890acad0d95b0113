use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::server::handlers::{activate_handler, health_handler, AppState};
use crate::server::logging::request_logging_middleware;

/// Build the application router.
///
/// # Routes
///
/// - `POST /v1/activate` - Activate a device under a license
/// - `GET /healthz` - Health probe
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/activate", post(activate_handler))
        .route("/healthz", get(health_handler))
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}
