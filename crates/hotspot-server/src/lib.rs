//! Hotspot Billing Server Library
//!
//! HTTP boundary for the billing core:
//! - axum routes over the purchase facade
//! - Funding and credential import endpoints for operators
//! - Error-to-status mapping

pub mod error;
pub mod routes;
