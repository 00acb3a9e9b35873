//! Hotspot Core Library
//!
//! Shared functionality for the hotspot billing components:
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Configuration resolution and hierarchy
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
