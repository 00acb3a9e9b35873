//! Catalog queries: users (referral directory), locations, and plans.
//!
//! These tables are owned by administrative collaborators; the purchase path
//! only reads them.

use hotspot_core::db::unix_timestamp;

use super::db::{BillingDatabase, DatabaseError};
use super::models::{Location, Plan, User};

/// Parameters for creating or updating a plan.
pub struct PlanParams<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub price: i64,
    pub duration_hours: i64,
    pub deferred_activation: bool,
    pub active: bool,
}

impl BillingDatabase {
    // =========================================================================
    // User directory
    // =========================================================================

    /// Register a user, optionally recording who referred them.
    ///
    /// The referrer is only set on first registration; later calls keep it.
    pub async fn register_user(
        &self,
        id: &str,
        referrer_id: Option<&str>,
    ) -> Result<User, DatabaseError> {
        if referrer_id == Some(id) {
            return Err(DatabaseError::Query(format!("User {id} cannot refer themselves")));
        }

        sqlx::query(
            "INSERT INTO users (id, referrer_id, created_at) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(referrer_id)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_user(id).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Referrer of a user, if any. Unknown users have no referrer.
    pub async fn referrer_of(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let referrer: Option<Option<String>> =
            sqlx::query_scalar("SELECT referrer_id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;

        Ok(referrer.flatten())
    }

    // =========================================================================
    // Locations
    // =========================================================================

    /// Create or update a location.
    pub async fn upsert_location(
        &self,
        id: &str,
        name: &str,
        active: bool,
    ) -> Result<Location, DatabaseError> {
        sqlx::query(
            "INSERT INTO locations (id, name, active, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, active = excluded.active",
        )
        .bind(id)
        .bind(name)
        .bind(active)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_location(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Location {id}")))
    }

    /// Get a location by ID.
    pub async fn get_location(&self, id: &str) -> Result<Option<Location>, DatabaseError> {
        let location = sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(location)
    }

    // =========================================================================
    // Plans
    // =========================================================================

    /// Create or update a plan.
    ///
    /// Price changes never touch existing purchases: each purchase carries
    /// its own copy of the amount and duration.
    pub async fn upsert_plan(&self, params: &PlanParams<'_>) -> Result<Plan, DatabaseError> {
        sqlx::query(
            "INSERT INTO plans (id, name, price, duration_hours, deferred_activation, active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, price = excluded.price, \
             duration_hours = excluded.duration_hours, \
             deferred_activation = excluded.deferred_activation, active = excluded.active",
        )
        .bind(params.id)
        .bind(params.name)
        .bind(params.price)
        .bind(params.duration_hours)
        .bind(params.deferred_activation)
        .bind(params.active)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_plan(params.id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Plan {}", params.id)))
    }

    /// Get a plan by ID.
    pub async fn get_plan(&self, id: &str) -> Result<Option<Plan>, DatabaseError> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(plan)
    }

    /// List active plans, cheapest first.
    pub async fn list_active_plans(&self) -> Result<Vec<Plan>, DatabaseError> {
        let plans =
            sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE active = 1 ORDER BY price, id")
                .fetch_all(self.pool())
                .await?;

        Ok(plans)
    }
}
