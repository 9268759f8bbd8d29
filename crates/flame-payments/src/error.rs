//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Provider did not answer in time
    #[error("Payment provider timed out after {0}s")]
    Timeout(u64),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Tier not in the price list
    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    /// Currency the provider adapter cannot charge in
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Stripe(_) | Self::Timeout(_))
    }

    /// Whether the error proves the webhook request was not authentic
    pub const fn is_verification_failure(&self) -> bool {
        matches!(self, Self::WebhookSignature(_) | Self::WebhookParse(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &str {
        match self {
            Self::Stripe(_) | Self::Timeout(_) => "Payment processing failed. Please try again.",
            Self::WebhookSignature(_) | Self::WebhookParse(_) => "Invalid signature.",
            Self::InvalidTier(_) => "Invalid tier.",
            Self::UnsupportedCurrency(_) | Self::Config(_) => "Payments are not configured.",
        }
    }
}
