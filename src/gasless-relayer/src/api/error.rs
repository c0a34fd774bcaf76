//! API error type and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    errors::{ErrorCategory, IntentError},
    rewards::DistributionError,
};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Conflict { code: &'static str, message: String },
}

/// Error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_id: Option<Uuid>,
}

fn intent_status(err: &IntentError) -> StatusCode {
    match err.category() {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => match err {
            IntentError::HumanityRejected(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        },
        ErrorCategory::Replay => StatusCode::CONFLICT,
        ErrorCategory::Resource => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Execution => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        ErrorCategory::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn distribution_status(err: &DistributionError) -> (StatusCode, &'static str) {
    match err {
        DistributionError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        // claim-proof reports an already claimed reward as absent, with its own code
        DistributionError::AlreadyClaimed => (StatusCode::NOT_FOUND, "ALREADY_CLAIMED"),
        DistributionError::Expired => (StatusCode::GONE, "EXPIRED"),
        DistributionError::NotDraft(_) => (StatusCode::CONFLICT, "NOT_DRAFT"),
        DistributionError::EmptyLeafSet
        | DistributionError::ZeroAmount(_)
        | DistributionError::InvalidPeriod { .. } => (StatusCode::BAD_REQUEST, "VALIDATION"),
        DistributionError::RootMismatch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "ROOT_MISMATCH"),
        DistributionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, relay_id) = match &self {
            ApiError::Intent(e) => {
                let relay_id = match e {
                    IntentError::NonceAlreadyUsed { relay_id, .. } => *relay_id,
                    _ => None,
                };
                (intent_status(e), e.code(), relay_id)
            }
            ApiError::Distribution(e) => {
                let (status, code) = distribution_status(e);
                (status, code, None)
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", None),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN", None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            ApiError::Conflict { code, .. } => (StatusCode::CONFLICT, *code, None),
        };

        if status.is_server_error() {
            tracing::error!(%status, code, error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            relay_id,
        };
        (status, Json(body)).into_response()
    }
}

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;
