//! SQLite-backed license registry and binding ledger.
//!
//! Two tables back the store:
//! - `licenses` keyed by `license_key`
//! - `license_bindings` keyed by `(license_key, device_id)`
//!
//! All mutating operations run inside a [`WriteScope`]: the store-wide write
//! lock plus one SQL transaction. Reads run in their own transaction without
//! the lock and see the last committed state.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{query, query_as, query_scalar, Sqlite, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::config::{get_config, DatabaseConfig};
use crate::errors::{LicenseError, LicenseResult};
use crate::license_key::{KeyGenerator, LicenseKeyConfig};
use crate::logging::{log_license_event, LicenseEvent};
use crate::store::models::{Binding, License, LicenseInfo, LicenseSummaryRow};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        license_key   TEXT PRIMARY KEY NOT NULL,
        device_limit  INTEGER NOT NULL CHECK (device_limit > 0),
        note          TEXT,
        enabled       BOOLEAN NOT NULL DEFAULT 1,
        created_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS license_bindings (
        license_key   TEXT NOT NULL REFERENCES licenses(license_key),
        device_id     TEXT NOT NULL,
        first_seen    TEXT NOT NULL,
        last_seen     TEXT NOT NULL,
        seen_count    INTEGER NOT NULL CHECK (seen_count > 0),
        PRIMARY KEY (license_key, device_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_licenses_created_at ON licenses (created_at)",
];

/// Log a storage failure and turn it into an opaque internal error.
pub(crate) fn internal(context: &'static str) -> impl FnOnce(sqlx::Error) -> LicenseError {
    move |e| {
        error!("{context} failed: {e}");
        LicenseError::Internal(format!("{context}: {e}"))
    }
}

fn ensure_positive_limit(limit: i64) -> LicenseResult<()> {
    if limit <= 0 {
        return Err(LicenseError::InvalidArgument(format!(
            "limit must be > 0, got {limit}"
        )));
    }
    Ok(())
}

fn normalize_note(note: &str) -> Option<String> {
    let note = note.trim();
    (!note.is_empty()).then(|| note.to_string())
}

/// The store's exclusive write section: write lock held for the lifetime of
/// one SQL transaction. Dropping it without [`WriteScope::commit`] rolls back.
pub(crate) struct WriteScope<'a> {
    // Declared first so the transaction is released before the lock.
    pub(crate) tx: Transaction<'static, Sqlite>,
    _guard: MutexGuard<'a, ()>,
}

impl WriteScope<'_> {
    pub(crate) async fn commit(self) -> LicenseResult<()> {
        self.tx.commit().await.map_err(internal("commit"))
    }
}

/// License admission store over a SQLite pool.
pub struct Database {
    pool: SqlitePool,
    keys: Box<dyn KeyGenerator>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open the store described by the global configuration.
    ///
    /// Uses `licensegate.toml` and `LICENSEGATE_*` environment variables.
    /// See `crate::config` for configuration options.
    pub async fn new() -> LicenseResult<Arc<Self>> {
        let config = get_config()?;
        let db = Self::open(&config.database)
            .await?
            .with_key_generator(LicenseKeyConfig::from(&config.license));
        Ok(Arc::new(db))
    }

    /// Open (creating if missing) the database file and apply the schema.
    ///
    /// Failing to obtain a connection within `acquire_timeout_secs` is fatal.
    pub async fn open(config: &DatabaseConfig) -> LicenseResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| LicenseError::ConfigError(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.acquire_timeout())
            .foreign_keys(true);

        ensure_parent_dir(options.get_filename()).await?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to open SQLite database {}: {e}", config.url);
                LicenseError::Internal(format!("failed to open database: {e}"))
            })?;

        let db = Self::from_pool(pool);
        db.migrate().await?;
        info!("License store opened at {}", config.url);
        Ok(db)
    }

    /// A private in-memory store on a single connection.
    pub async fn in_memory() -> LicenseResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(internal("connect in-memory database"))?;

        let db = Self::from_pool(pool);
        db.migrate().await?;
        Ok(db)
    }

    /// Wrap an existing pool. The schema is not applied; call [`Database::migrate`].
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            keys: Box::new(LicenseKeyConfig::default()),
            writer: Mutex::new(()),
        }
    }

    /// Replace the source of new license keys.
    pub fn with_key_generator<K: KeyGenerator + 'static>(mut self, keys: K) -> Self {
        self.keys = Box::new(keys);
        self
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> LicenseResult<()> {
        let mut scope = self.begin_write().await?;
        for statement in SCHEMA {
            query(statement)
                .execute(&mut *scope.tx)
                .await
                .map_err(internal("apply schema"))?;
        }
        scope.commit().await
    }

    /// Returns `true` when the database answers a trivial query.
    pub async fn ping(&self) -> bool {
        query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Enter the exclusive write section and open a transaction.
    pub(crate) async fn begin_write(&self) -> LicenseResult<WriteScope<'_>> {
        let guard = self.writer.lock().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(internal("begin write transaction"))?;
        Ok(WriteScope { tx, _guard: guard })
    }

    async fn begin_read(&self) -> LicenseResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(internal("begin read transaction"))
    }

    // ========================================================================
    // License Registry
    // ========================================================================

    /// Issue a new license with a freshly generated key.
    ///
    /// Returns:
    /// - `Err(InvalidArgument)` if `limit <= 0`
    /// - `Err(Conflict)` if the generated key is already taken; nothing is written
    /// - `Ok(License)` with `enabled = true` otherwise
    pub async fn create_license(&self, limit: i64, note: &str) -> LicenseResult<License> {
        ensure_positive_limit(limit)?;

        let license = License {
            key: self.keys.generate()?,
            limit,
            note: normalize_note(note),
            enabled: true,
            created_at: Utc::now().naive_utc(),
        };

        let mut scope = self.begin_write().await?;

        if fetch_license(&mut scope.tx, &license.key).await?.is_some() {
            warn!("Generated license key collided: {}", license.key);
            return Err(LicenseError::Conflict(format!(
                "license key {} already exists, try again",
                license.key
            )));
        }

        query(
            "INSERT INTO licenses (license_key, device_limit, note, enabled, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&license.key)
        .bind(license.limit)
        .bind(&license.note)
        .bind(license.enabled)
        .bind(license.created_at)
        .execute(&mut *scope.tx)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => LicenseError::Conflict(format!(
                "license key {} already exists, try again",
                license.key
            )),
            _ => internal("insert license")(e),
        })?;

        scope.commit().await?;

        log_license_event(
            LicenseEvent::Created,
            &license.key,
            Some(&format!("limit={}", license.limit)),
        );
        Ok(license)
    }

    /// Change the device limit. Existing bindings above the new limit stay valid.
    pub async fn set_limit(&self, key: &str, limit: i64) -> LicenseResult<License> {
        ensure_positive_limit(limit)?;

        let mut scope = self.begin_write().await?;
        let mut license = fetch_license(&mut scope.tx, key)
            .await?
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))?;

        query("UPDATE licenses SET device_limit = ? WHERE license_key = ?")
            .bind(limit)
            .bind(key)
            .execute(&mut *scope.tx)
            .await
            .map_err(internal("update license limit"))?;

        scope.commit().await?;

        license.limit = limit;
        log_license_event(
            LicenseEvent::LimitChanged,
            key,
            Some(&format!("limit={limit}")),
        );
        Ok(license)
    }

    /// Enable or disable a license. Bindings are never touched.
    pub async fn set_enabled(&self, key: &str, enabled: bool) -> LicenseResult<License> {
        let mut scope = self.begin_write().await?;
        let mut license = fetch_license(&mut scope.tx, key)
            .await?
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))?;

        query("UPDATE licenses SET enabled = ? WHERE license_key = ?")
            .bind(enabled)
            .bind(key)
            .execute(&mut *scope.tx)
            .await
            .map_err(internal("update license enabled flag"))?;

        scope.commit().await?;

        license.enabled = enabled;
        let event = if enabled {
            LicenseEvent::Enabled
        } else {
            LicenseEvent::Disabled
        };
        log_license_event(event, key, None);
        Ok(license)
    }

    /// A license with its used count and every binding, most recently seen first.
    pub async fn get_info(&self, key: &str) -> LicenseResult<LicenseInfo> {
        let mut tx = self.begin_read().await?;

        let license = fetch_license(&mut tx, key)
            .await?
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))?;

        let bindings = query_as::<_, Binding>(
            "SELECT device_id, first_seen, last_seen, seen_count \
             FROM license_bindings WHERE license_key = ? \
             ORDER BY last_seen DESC, device_id ASC",
        )
        .bind(key)
        .fetch_all(&mut *tx)
        .await
        .map_err(internal("load bindings"))?;

        let used = count_bindings(&mut tx, key).await?;

        Ok(LicenseInfo {
            license,
            used,
            bindings,
        })
    }

    /// All licenses, newest first, with used counts but without binding lists.
    pub async fn list_licenses(&self) -> LicenseResult<Vec<LicenseInfo>> {
        let rows = query_as::<_, LicenseSummaryRow>(
            "SELECT l.license_key, l.device_limit, l.note, l.enabled, l.created_at, \
                    COUNT(b.device_id) AS used \
             FROM licenses l \
             LEFT JOIN license_bindings b ON b.license_key = l.license_key \
             GROUP BY l.license_key \
             ORDER BY l.created_at DESC, l.license_key ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal("list licenses"))?;

        Ok(rows.into_iter().map(LicenseInfo::from).collect())
    }
}

async fn ensure_parent_dir(path: &Path) -> LicenseResult<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent).await.map_err(|e| {
        error!("Failed to create database directory {}: {e}", parent.display());
        LicenseError::Internal(format!("failed to create {}: {e}", parent.display()))
    })
}

// ============================================================================
// Transaction-scoped lookups
// ============================================================================

pub(crate) async fn fetch_license(
    tx: &mut Transaction<'static, Sqlite>,
    key: &str,
) -> LicenseResult<Option<License>> {
    query_as::<_, License>(
        "SELECT license_key, device_limit, note, enabled, created_at \
         FROM licenses WHERE license_key = ?",
    )
    .bind(key)
    .fetch_optional(&mut **tx)
    .await
    .map_err(internal("load license"))
}

pub(crate) async fn fetch_binding(
    tx: &mut Transaction<'static, Sqlite>,
    key: &str,
    device_id: &str,
) -> LicenseResult<Option<Binding>> {
    query_as::<_, Binding>(
        "SELECT device_id, first_seen, last_seen, seen_count \
         FROM license_bindings WHERE license_key = ? AND device_id = ?",
    )
    .bind(key)
    .bind(device_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(internal("load binding"))
}

/// Authoritative distinct-device count, read inside the caller's transaction.
pub(crate) async fn count_bindings(
    tx: &mut Transaction<'static, Sqlite>,
    key: &str,
) -> LicenseResult<i64> {
    query_scalar::<_, i64>("SELECT COUNT(*) FROM license_bindings WHERE license_key = ?")
        .bind(key)
        .fetch_one(&mut **tx)
        .await
        .map_err(internal("count bindings"))
}
