use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::server::logging::HealthResponse;
use crate::store::{ActivateReason, ActivateResult, Database};

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

/// Body of `POST /v1/activate`.
///
/// Missing fields decode as empty strings so the store answers
/// `invalid_request`; unknown fields are a decoding error. `device_id` is
/// accepted in place of `server_id`, but not alongside it.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivateRequest {
    #[serde(default)]
    pub license: String,
    #[serde(default, alias = "device_id")]
    pub server_id: String,
}

/// Handler for device activation.
///
/// The body is decoded as JSON whatever the `Content-Type` header says.
///
/// Behavior:
/// - Malformed body → 400 with reason `bad_json`, store not consulted
/// - Admitted → 200, rejected by policy → 403, body is the verdict verbatim
/// - Store failure → 500 with reason `server_error`
pub async fn activate_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let req = match serde_json::from_slice::<ActivateRequest>(&body) {
        Ok(req) => req,
        Err(e) => {
            warn!("Rejected activation body: {e}");
            return verdict_response(
                StatusCode::BAD_REQUEST,
                ActivateResult::rejected(ActivateReason::BadJson, 0, 0),
            );
        }
    };

    info!(
        "Activation request for license={} server_id={}",
        req.license, req.server_id
    );

    match state.db.activate(&req.license, &req.server_id).await {
        Ok(result) => {
            let status = if result.ok {
                StatusCode::OK
            } else {
                StatusCode::FORBIDDEN
            };
            verdict_response(status, result)
        }
        Err(e) => {
            error!("Activation failed for license={}: {e}", req.license);
            verdict_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                ActivateResult::rejected(ActivateReason::ServerError, 0, 0),
            )
        }
    }
}

/// JSON verdict body; the reason also rides along as a response extension
/// for the request logging middleware.
fn verdict_response(status: StatusCode, result: ActivateResult) -> Response {
    let mut response = (status, Json(result)).into_response();
    response.extensions_mut().insert(result.reason);
    response
}

/// Liveness probe with a database ping.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(state.db.ping().await))
}
