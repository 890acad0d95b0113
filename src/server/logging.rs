//! Request logging middleware and health probe body.
//!
//! Every request runs inside a `request` span carrying a request id, method
//! and path. The id is taken from an incoming `X-Request-Id` header when it
//! is a sane token, otherwise a fresh UUID, and is echoed on the response.
//! Activation responses also log the verdict reason the handler attached.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use licensegate::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/healthz", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::store::ActivateReason;

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Longest caller-supplied request id we keep.
const MAX_REQUEST_ID_LEN: usize = 64;

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// The caller's request id if it is short and printable, else a new one.
fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_REQUEST_ID_LEN
                && id
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
        .map(str::to_string)
        .unwrap_or_else(generate_request_id)
}

/// Tag each request with an id, time it, and log how it ended.
///
/// Client and server errors are logged at `warn`.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = request_id_from(request.headers());
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    let status = response.status().as_u16();
    let reason = response
        .extensions()
        .get::<ActivateReason>()
        .map(ActivateReason::as_str);

    span.in_scope(|| match reason {
        Some(reason) if status >= 400 => {
            warn!(status, reason, elapsed_ms, "Request rejected")
        }
        Some(reason) => info!(status, reason, elapsed_ms, "Request completed"),
        None if status >= 400 => warn!(status, elapsed_ms, "Request failed"),
        None => info!(status, elapsed_ms, "Request completed"),
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    /// Whether the license store answered a ping
    pub database: bool,
}

impl HealthResponse {
    pub fn new(db_connected: bool) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn caller_request_id_is_kept_when_sane() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("trace-42_a"));
        assert_eq!(request_id_from(&headers), "trace-42_a");
    }

    #[test]
    fn odd_caller_request_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("has spaces; and=stuff"));
        assert!(Uuid::parse_str(&request_id_from(&headers)).is_ok());

        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_str(&long).unwrap());
        assert!(Uuid::parse_str(&request_id_from(&headers)).is_ok());

        assert!(Uuid::parse_str(&request_id_from(&HeaderMap::new())).is_ok());
    }

    #[test]
    fn health_response_healthy() {
        let health = HealthResponse::new(true);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "licensegate");
        assert!(health.database);
    }

    #[test]
    fn health_response_degraded() {
        let health = HealthResponse::new(false);
        assert_eq!(health.status, "degraded");
        assert!(!health.database);
    }
}
