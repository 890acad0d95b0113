//! Activation: the atomic admit / refresh / reject decision.

use chrono::Utc;
use sqlx::query;

use crate::errors::LicenseResult;
use crate::logging::{log_binding_event, LicenseEvent};
use crate::store::database::{count_bindings, fetch_binding, fetch_license, internal, Database};
use crate::store::models::{ActivateReason, ActivateResult, MAX_DEVICE_ID_LEN};

impl Database {
    /// Activate `device_id` under the license `license_key`.
    ///
    /// # Behavior
    /// - Both inputs are trimmed; empty input → `invalid_request`
    /// - Device ids longer than 128 characters → `server_id_too_long`
    /// - Unknown key → `not_found`; disabled license → `disabled`
    /// - A device already bound is refreshed (`last_seen`, `seen_count`) no
    ///   matter how `used` compares to `limit`
    /// - A new device is bound only while `used < limit`, else `limit_reached`
    ///
    /// The lookup, the capacity check and the write happen in one write scope,
    /// so concurrent activations can never push `used` past `limit`.
    ///
    /// Policy rejections are `Ok`; `Err` only signals a storage failure, in
    /// which case nothing was written.
    pub async fn activate(
        &self,
        license_key: &str,
        device_id: &str,
    ) -> LicenseResult<ActivateResult> {
        let key = license_key.trim();
        let device_id = device_id.trim();

        if key.is_empty() || device_id.is_empty() {
            return Ok(ActivateResult::rejected(ActivateReason::InvalidRequest, 0, 0));
        }
        if device_id.chars().count() > MAX_DEVICE_ID_LEN {
            return Ok(ActivateResult::rejected(ActivateReason::ServerIdTooLong, 0, 0));
        }

        let now = Utc::now().naive_utc();
        let mut scope = self.begin_write().await?;

        let Some(license) = fetch_license(&mut scope.tx, key).await? else {
            log_binding_event(
                LicenseEvent::Rejected,
                key,
                device_id,
                0,
                0,
                Some(ActivateReason::NotFound.as_str()),
            );
            return Ok(ActivateResult::rejected(ActivateReason::NotFound, 0, 0));
        };

        if !license.enabled {
            log_binding_event(
                LicenseEvent::Rejected,
                key,
                device_id,
                0,
                license.limit,
                Some(ActivateReason::Disabled.as_str()),
            );
            return Ok(ActivateResult::rejected(
                ActivateReason::Disabled,
                0,
                license.limit,
            ));
        }

        let newly_bound = match fetch_binding(&mut scope.tx, key, device_id).await? {
            Some(existing) => {
                query(
                    "UPDATE license_bindings SET last_seen = ?, seen_count = ? \
                     WHERE license_key = ? AND device_id = ?",
                )
                .bind(existing.last_seen.max(now))
                .bind(existing.seen_count + 1)
                .bind(key)
                .bind(device_id)
                .execute(&mut *scope.tx)
                .await
                .map_err(internal("refresh binding"))?;
                false
            }
            None => {
                let used = count_bindings(&mut scope.tx, key).await?;
                if used >= license.limit {
                    log_binding_event(
                        LicenseEvent::Rejected,
                        key,
                        device_id,
                        used,
                        license.limit,
                        Some(ActivateReason::LimitReached.as_str()),
                    );
                    return Ok(ActivateResult::rejected(
                        ActivateReason::LimitReached,
                        used,
                        license.limit,
                    ));
                }

                query(
                    "INSERT INTO license_bindings \
                     (license_key, device_id, first_seen, last_seen, seen_count) \
                     VALUES (?, ?, ?, ?, 1)",
                )
                .bind(key)
                .bind(device_id)
                .bind(now)
                .bind(now)
                .execute(&mut *scope.tx)
                .await
                .map_err(internal("insert binding"))?;
                true
            }
        };

        let used = count_bindings(&mut scope.tx, key).await?;
        scope.commit().await?;

        let event = if newly_bound {
            LicenseEvent::Bound
        } else {
            LicenseEvent::Refreshed
        };
        log_binding_event(event, key, device_id, used, license.limit, None);

        Ok(ActivateResult::admitted(used, license.limit, newly_bound))
    }
}
