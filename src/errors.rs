//! Error taxonomy shared by the store, the operator front ends and the server.
//!
//! Activation verdicts (`not_found`, `disabled`, `limit_reached`, ...) are not
//! errors; they travel as data in [`crate::store::ActivateResult`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// Rejected before any write (non-positive limit, malformed input).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown license key.
    #[error("license not found: {0}")]
    NotFound(String),

    /// Generated key already exists; the caller may retry with a fresh key.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Storage or serialization failure. Nothing was committed.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type LicenseResult<T> = Result<T, LicenseError>;

impl LicenseError {
    /// Short machine-friendly name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            LicenseError::InvalidArgument(_) => "invalid_argument",
            LicenseError::NotFound(_) => "not_found",
            LicenseError::Conflict(_) => "conflict",
            LicenseError::ConfigError(_) => "config_error",
            LicenseError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = LicenseError::NotFound("LIC-AAAA".to_string());
        assert_eq!(err.to_string(), "license not found: LIC-AAAA");
        assert_eq!(err.kind(), "not_found");
    }
}
