//! Database connection and initialization.

pub use hotspot_core::db::DatabaseError;

hotspot_core::define_database!(BillingDatabase, "Billing database migrations complete");
