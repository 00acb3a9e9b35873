//! HTTP routes over the purchase facade and the operator collaborators.
//!
//! The caller is identified by the `x-user-id` header; authentication is
//! expected to happen in front of this service.
//!
//! Wallet funding and credential import live on a separate admin router,
//! served on its own listener, so the public listener never exposes them.

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use hotspot_billing::storage::{
    FundingOutcome, ImportReport, NewCredential, Plan, Purchase, ReferralSummary,
};
use hotspot_billing::{BillingDatabase, PurchaseError, PurchaseService, Receipt};

use crate::error::{ApiError, ApiResult};

pub const USER_HEADER: &str = "x-user-id";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: PurchaseService<BillingDatabase>,
    pub db: BillingDatabase,
}

impl AppState {
    pub fn new(db: BillingDatabase, commission_rate_bps: u32) -> Self {
        Self {
            service: PurchaseService::new(db.clone(), commission_rate_bps),
            db,
        }
    }
}

/// Buyer-facing routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/plans", get(list_plans))
        .route("/v1/purchases", post(create_purchase).get(list_purchases))
        .route("/v1/purchases/{id}", get(get_purchase))
        .route("/v1/purchases/{id}/activate", post(activate_purchase))
        .route("/v1/wallet", get(wallet))
        .route("/v1/referrals/summary", get(referral_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Payment-provider and operator routes. Bind to a private address.
pub fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/funding", post(apply_funding))
        .route("/v1/credentials/import", post(import_credentials))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The authenticated caller, taken from [`USER_HEADER`].
#[derive(Debug, Clone)]
pub struct Caller(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .ok_or(ApiError::MissingUser)
    }
}

// =========================================================================
// Request and response bodies
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub plan_id: String,
    pub location_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub user_id: String,
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct FundingRequest {
    pub external_ref: String,
    pub user_id: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FundingResponse {
    /// `"applied"` or `"duplicate"`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub location_id: String,
    pub plan_id: String,
    pub credentials: Vec<NewCredential>,
}

// =========================================================================
// Handlers
// =========================================================================

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /v1/plans`
pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(state.db.list_active_plans().await?))
}

/// `POST /v1/purchases`
pub async fn create_purchase(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Json(body): Json<PurchaseRequest>,
) -> ApiResult<(StatusCode, Json<Receipt>)> {
    let receipt = state
        .service
        .purchase(&user_id, &body.plan_id, &body.location_id)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /v1/purchases`
pub async fn list_purchases(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<Purchase>>> {
    Ok(Json(state.service.purchases(&user_id, query.offset).await?))
}

/// `GET /v1/purchases/{id}`
pub async fn get_purchase(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Receipt>> {
    Ok(Json(state.service.receipt(&id, &user_id).await?))
}

/// `POST /v1/purchases/{id}/activate`
pub async fn activate_purchase(
    State(state): State<AppState>,
    Caller(user_id): Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Receipt>> {
    Ok(Json(state.service.activate(&id, &user_id).await?))
}

/// `GET /v1/wallet`
pub async fn wallet(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> ApiResult<Json<WalletResponse>> {
    let balance = state.service.balance(&user_id).await?;
    Ok(Json(WalletResponse { user_id, balance }))
}

/// `GET /v1/referrals/summary`
pub async fn referral_summary(
    State(state): State<AppState>,
    Caller(user_id): Caller,
) -> ApiResult<Json<ReferralSummary>> {
    Ok(Json(state.service.referral_summary(&user_id).await?))
}

/// `POST /v1/funding`: payment-provider confirmation, idempotent by
/// `external_ref`.
pub async fn apply_funding(
    State(state): State<AppState>,
    Json(body): Json<FundingRequest>,
) -> ApiResult<Json<FundingResponse>> {
    if body.external_ref.trim().is_empty() || body.user_id.trim().is_empty() {
        return Err(PurchaseError::InvalidRequest(
            "external_ref and user_id are required".into(),
        )
        .into());
    }
    if body.amount <= 0 {
        return Err(PurchaseError::InvalidRequest(format!(
            "amount must be positive, got {}",
            body.amount
        ))
        .into());
    }

    let outcome = state
        .db
        .apply_funding(&body.external_ref, &body.user_id, body.amount)
        .await?;

    let response = match outcome {
        FundingOutcome::Applied { balance } => {
            info!(
                external_ref = %body.external_ref,
                user_id = %body.user_id,
                amount = body.amount,
                balance,
                "Funding applied"
            );
            FundingResponse {
                status: "applied".into(),
                balance: Some(balance),
            }
        }
        FundingOutcome::Duplicate => {
            info!(external_ref = %body.external_ref, "Duplicate funding event ignored");
            FundingResponse {
                status: "duplicate".into(),
                balance: None,
            }
        }
    };
    Ok(Json(response))
}

/// `POST /v1/credentials/import`
pub async fn import_credentials(
    State(state): State<AppState>,
    Json(body): Json<ImportRequest>,
) -> ApiResult<Json<ImportReport>> {
    if state.db.get_location(&body.location_id).await?.is_none() {
        return Err(PurchaseError::LocationUnavailable(body.location_id).into());
    }
    if state.db.get_plan(&body.plan_id).await?.is_none() {
        return Err(PurchaseError::PlanUnavailable(body.plan_id).into());
    }

    let report = state
        .db
        .import_credentials(&body.location_id, &body.plan_id, &body.credentials)
        .await?;
    info!(
        location_id = %body.location_id,
        plan_id = %body.plan_id,
        inserted = report.inserted,
        rejected = report.rejected.len(),
        "Credentials imported"
    );
    Ok(Json(report))
}
