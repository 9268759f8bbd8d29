//! API Errors
//!
//! Every failure leaves the server as `{ "error": CODE, "message": ..., "details"?: [...] }`
//! with a stable status code.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use flame_core::{FieldViolation, FlameError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Flame(#[from] FlameError),

    #[error("Invalid request body: {0}")]
    Body(String),

    #[error("Too many requests")]
    RateLimited,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldViolation>,
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Flame(err) => match err {
                FlameError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                FlameError::NotFound(_) => StatusCode::NOT_FOUND,
                FlameError::Forbidden(_) => StatusCode::FORBIDDEN,
                FlameError::Unauthorized => StatusCode::UNAUTHORIZED,
                FlameError::Config(_) | FlameError::Verification(_) | FlameError::InvalidTier(_) => {
                    StatusCode::BAD_REQUEST
                }
                FlameError::Payment(_) => StatusCode::BAD_GATEWAY,
                FlameError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Body(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    const fn code(&self) -> &'static str {
        match self {
            Self::Flame(err) => match err {
                FlameError::Validation(_) => "VALIDATION_ERROR",
                FlameError::NotFound(_) => "NOT_FOUND",
                FlameError::Forbidden(_) => "FORBIDDEN",
                FlameError::Unauthorized => "UNAUTHORIZED",
                FlameError::Config(_) => "NOT_CONFIGURED",
                FlameError::Verification(_) => "VERIFICATION_FAILED",
                FlameError::InvalidTier(_) => "INVALID_TIER",
                FlameError::Payment(_) => "PAYMENT_PROVIDER_ERROR",
                FlameError::Store(_) => "INTERNAL_ERROR",
            },
            Self::Body(_) => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMITED",
        }
    }

    fn into_body(self) -> ErrorResponse {
        let error = self.code();
        match self {
            Self::Flame(FlameError::Validation(failure)) => ErrorResponse {
                error,
                message: failure.to_string(),
                details: failure.fields,
            },
            Self::Flame(FlameError::Payment(err)) => ErrorResponse {
                error,
                message: err.user_message().to_string(),
                details: Vec::new(),
            },
            Self::Flame(FlameError::Store(_)) => ErrorResponse {
                error,
                message: "Internal server error".into(),
                details: Vec::new(),
            },
            Self::Body(message) => ErrorResponse {
                error,
                message: message.clone(),
                details: vec![FieldViolation {
                    field: "body".into(),
                    code: "invalid_body".into(),
                    message,
                }],
            },
            other => ErrorResponse {
                error,
                message: other.to_string(),
                details: Vec::new(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        }
        (status, Json(self.into_body())).into_response()
    }
}
