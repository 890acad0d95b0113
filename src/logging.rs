//! Tracing setup and structured license events.

use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global `fmt` subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `logging.level`. Does nothing when
/// logging is disabled or a subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) {
    if !config.enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License was issued
    Created,
    /// Device limit was changed
    LimitChanged,
    /// License was re-enabled
    Enabled,
    /// License was disabled
    Disabled,
    /// A new device was admitted
    Bound,
    /// An already bound device activated again
    Refreshed,
    /// An activation attempt was turned away
    Rejected,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Created => "created",
            LicenseEvent::LimitChanged => "limit_changed",
            LicenseEvent::Enabled => "enabled",
            LicenseEvent::Disabled => "disabled",
            LicenseEvent::Bound => "bound",
            LicenseEvent::Refreshed => "refreshed",
            LicenseEvent::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Log a registry-level license event.
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match details {
        Some(d) => info!(details = %d, "License event occurred"),
        None => info!("License event occurred"),
    }
}

/// Log an admission outcome for one device.
///
/// Rejections are logged at `warn` with the verdict as `reason`.
pub fn log_binding_event(
    event: LicenseEvent,
    license_key: &str,
    device_id: &str,
    used: i64,
    limit: i64,
    reason: Option<&str>,
) {
    let span = info_span!(
        "license_binding",
        event = %event,
        license_key = %license_key,
        device_id = %device_id,
    );
    let _enter = span.enter();

    match (event, reason) {
        (LicenseEvent::Rejected, Some(r)) => warn!(reason = %r, used, limit, "Activation rejected"),
        (LicenseEvent::Rejected, None) => warn!(used, limit, "Activation rejected"),
        _ => info!(used, limit, "License binding event occurred"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(LicenseEvent::LimitChanged.to_string(), "limit_changed");
        assert_eq!(LicenseEvent::Bound.to_string(), "bound");
    }

    #[test]
    fn disabled_logging_is_a_noop() {
        init_tracing(&LoggingConfig {
            enabled: false,
            level: "info".to_string(),
        });
    }
}
