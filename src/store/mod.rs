//! The license admission store.
//!
//! - `models`    → License, Binding, LicenseInfo, ActivateResult
//! - `database`  → SQLite pool, write scope, registry operations
//! - `admission` → `Database::activate`

pub mod admission;
pub mod database;
pub mod models;

pub use database::Database;
pub use models::{
    ActivateReason, ActivateResult, Binding, License, LicenseInfo, MAX_DEVICE_ID_LEN,
};
