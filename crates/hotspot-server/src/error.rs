//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use hotspot_billing::{DatabaseError, PurchaseError};

/// Error body: `{"error": <code>, "message": <text>}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Purchase(#[from] PurchaseError),

    #[error("Missing or empty x-user-id header")]
    MissingUser,
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        Self::Purchase(e.into())
    }
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingUser => StatusCode::UNAUTHORIZED,
            Self::Purchase(e) => match e {
                PurchaseError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                PurchaseError::PoolExhausted { .. } | PurchaseError::InvalidState(_) => {
                    StatusCode::CONFLICT
                }
                PurchaseError::PlanUnavailable(_) | PurchaseError::LocationUnavailable(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PurchaseError::Busy => StatusCode::TOO_MANY_REQUESTS,
                PurchaseError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                PurchaseError::PurchaseNotFound(_) => StatusCode::NOT_FOUND,
                PurchaseError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
                PurchaseError::InternalInconsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingUser => "unauthenticated",
            Self::Purchase(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
