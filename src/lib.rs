//! licensegate - license keys with a per-license device activation ceiling.
//!
//! # Features
//!
//! - `server` - HTTP activation endpoint, CLI and the `licensegate_server`
//!   binary. Enabled by default.
//!
//! The license admission store ([`store::Database`]) is always available:
//! it issues licenses, keeps the per-license device ledger and decides
//! activations atomically.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() -> licensegate::errors::LicenseResult<()> {
//! use licensegate::store::Database;
//!
//! let db = Database::in_memory().await?;
//! let license = db.create_license(2, "Acme").await?;
//! let verdict = db.activate(&license.key, "server-01").await?;
//! assert!(verdict.ok && verdict.newly_bound);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod license_key;
pub mod logging;
pub mod operator;
pub mod store;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
