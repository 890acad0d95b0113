// src/server/mod.rs

//! Server-side components for licensegate.
//!
//! This module contains:
//! - `handlers`  → Axum HTTP handlers for activation and health
//! - `routes`    → Router builder
//! - `logging`   → Request logging middleware
//! - `commands`  → CLI parsing, one-shot license operations, console driver

pub mod commands;
pub mod handlers;
pub mod logging;
pub mod routes;

pub use commands::{execute_license_command, parse_command, run_console, Command, LicenseCommand};
pub use handlers::{activate_handler, health_handler, ActivateRequest, AppState};
pub use routes::build_router;
