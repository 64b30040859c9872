//! Error Handling Module
//!
//! One error type for every handler. Each variant maps to a status code and a
//! stable `code` string the storefront can branch on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError, RefundError, ReviewError, UnknownStatus, VerificationError};
use crate::domain::pricing::PricingError;
use crate::domain::value_objects::PhoneError;
use crate::reporting::RangeError;

#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 ============
    #[error("Validation failed: {0}")]
    Validation(String),

    // ============ 401 / 403 ============
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Forbidden")]
    Forbidden,

    // ============ 404 ============
    #[error("{0} not found")]
    NotFound(&'static str),

    // ============ 409 ============
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ 422 ============
    #[error("{message}")]
    Rejected { code: &'static str, message: String },

    // ============ 502 ============
    #[error("{service} call failed: {message}")]
    Upstream { service: &'static str, message: String },

    // ============ 500 ============
    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(message.into()) }

    pub fn rejected(code: &'static str, message: impl ToString) -> Self {
        Self::Rejected { code, message: message.to_string() }
    }

    pub fn upstream(service: &'static str, message: impl ToString) -> Self {
        Self::Upstream { service, message: message.to_string() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message, details) = match &self {
            ApiError::Validation(msg) => ("VALIDATION_ERROR", "Validation failed".to_string(), Some(msg.clone())),
            ApiError::Unauthorized(msg) => ("UNAUTHORIZED", msg.to_string(), None),
            ApiError::Forbidden => ("FORBIDDEN", "Not allowed".to_string(), None),
            ApiError::NotFound(resource) => ("NOT_FOUND", format!("{resource} not found"), None),
            ApiError::Conflict(msg) => ("CONFLICT", msg.clone(), None),
            ApiError::Rejected { code, message } => (*code, message.clone(), None),
            ApiError::Upstream { service, message } => {
                tracing::warn!(service, %message, "upstream call failed");
                ("UPSTREAM_ERROR", format!("{service} is not responding as expected"), None)
            }
            ApiError::Internal => {
                tracing::error!("Internal error: {:?}", self);
                ("INTERNAL_ERROR", "An internal error occurred".to_string(), None)
            }
        };

        let body = ErrorResponse { error: message, code: code.to_string(), details };
        (self.status(), Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::Internal
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<PhoneError> for ApiError {
    fn from(err: PhoneError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<UnknownStatus> for ApiError {
    fn from(err: UnknownStatus) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<RangeError> for ApiError {
    fn from(err: RangeError) -> Self { ApiError::Validation(err.to_string()) }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Incorrect => ApiError::rejected("CODE_INCORRECT", err),
            VerificationError::Expired => ApiError::rejected("CODE_EXPIRED", err),
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => ApiError::Validation(err.to_string()),
            OrderError::UnknownProduct(_) => ApiError::Validation(err.to_string()),
            OrderError::InvalidTransition(_) => ApiError::rejected("INVALID_ORDER_STATE", err),
            OrderError::PaidWithOtherPayment => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<RefundError> for ApiError {
    fn from(err: RefundError) -> Self {
        match err {
            RefundError::UnknownProduct(_) => ApiError::NotFound("Order item"),
            RefundError::NotPaid(_) => ApiError::rejected("INVALID_ORDER_STATE", err),
            RefundError::NotDelivered => ApiError::rejected("NOT_DELIVERED", err),
            RefundError::WindowClosed => ApiError::rejected("REFUND_WINDOW_CLOSED", err),
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::TokenUsed => ApiError::Conflict(err.to_string()),
            ReviewError::RatingOutOfRange | ReviewError::EmptyContent => ApiError::Validation(err.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
