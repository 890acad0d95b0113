//! Records owned by the license admission store and the read projections
//! it hands out.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Longest device identifier accepted by activation, in characters.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// A unit of entitlement: a unique key and how many distinct devices may use it.
///
/// Mirrors one row of the `licenses` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct License {
    #[sqlx(rename = "license_key")]
    pub key: String,
    #[sqlx(rename = "device_limit")]
    pub limit: i64,
    pub note: Option<String>,
    pub enabled: bool,
    pub created_at: NaiveDateTime,
}

/// One device bound to a license.
///
/// Mirrors one row of the `license_bindings` table (minus the license key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Binding {
    pub device_id: String,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub seen_count: i64,
}

/// A license together with its usage.
///
/// `used` is the number of distinct bound devices. `bindings` is ordered
/// most-recently-seen first and is left empty in list (summary) views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub license: License,
    pub used: i64,
    pub bindings: Vec<Binding>,
}

#[derive(Debug, FromRow)]
pub(crate) struct LicenseSummaryRow {
    #[sqlx(flatten)]
    pub license: License,
    pub used: i64,
}

impl From<LicenseSummaryRow> for LicenseInfo {
    fn from(row: LicenseSummaryRow) -> Self {
        Self {
            license: row.license,
            used: row.used,
            bindings: Vec::new(),
        }
    }
}

/// Verdict of an activation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivateReason {
    Ok,
    InvalidRequest,
    ServerIdTooLong,
    NotFound,
    Disabled,
    LimitReached,
    /// Produced by the HTTP endpoint for unparseable bodies, never by the store.
    BadJson,
    /// Produced by the HTTP endpoint when the store fails, never by the store.
    ServerError,
}

impl ActivateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivateReason::Ok => "ok",
            ActivateReason::InvalidRequest => "invalid_request",
            ActivateReason::ServerIdTooLong => "server_id_too_long",
            ActivateReason::NotFound => "not_found",
            ActivateReason::Disabled => "disabled",
            ActivateReason::LimitReached => "limit_reached",
            ActivateReason::BadJson => "bad_json",
            ActivateReason::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for ActivateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured, non-exceptional outcome of `activate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivateResult {
    pub ok: bool,
    pub reason: ActivateReason,
    pub used: i64,
    pub limit: i64,
    pub newly_bound: bool,
}

impl ActivateResult {
    pub fn admitted(used: i64, limit: i64, newly_bound: bool) -> Self {
        Self {
            ok: true,
            reason: ActivateReason::Ok,
            used,
            limit,
            newly_bound,
        }
    }

    pub fn rejected(reason: ActivateReason, used: i64, limit: i64) -> Self {
        Self {
            ok: false,
            reason,
            used,
            limit,
            newly_bound: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_result_wire_shape() {
        let json = serde_json::to_value(ActivateResult::rejected(
            ActivateReason::LimitReached,
            2,
            2,
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ok": false,
                "reason": "limit_reached",
                "used": 2,
                "limit": 2,
                "newly_bound": false
            })
        );
    }

    #[test]
    fn reason_display_matches_serde() {
        for reason in [
            ActivateReason::Ok,
            ActivateReason::ServerIdTooLong,
            ActivateReason::BadJson,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason));
        }
    }
}
