//! Error Types for the Flame Lifecycle

use flame_payments::PaymentError;
use flame_store::StoreError;
use thiserror::Error;

use crate::validation::ValidationFailure;

pub type Result<T> = std::result::Result<T, FlameError>;

#[derive(Error, Debug)]
pub enum FlameError {
    #[error("Validation failed: {0}")]
    Validation(ValidationFailure),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error("Payment provider error: {0}")]
    Payment(PaymentError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<PaymentError> for FlameError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::InvalidTier(tier) => Self::InvalidTier(tier),
            PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => {
                Self::Verification(err.user_message().to_string())
            }
            PaymentError::Config(msg) | PaymentError::UnsupportedCurrency(msg) => Self::Config(msg),
            other => Self::Payment(other),
        }
    }
}

impl From<ValidationFailure> for FlameError {
    fn from(failure: ValidationFailure) -> Self {
        Self::Validation(failure)
    }
}

impl FlameError {
    /// Whether the same request could succeed later
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Payment(err) => err.is_retryable(),
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}
