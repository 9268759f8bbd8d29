//! Mock Payment Gateway
//!
//! For testing and demo purposes. Records every request and hands back a
//! fake hosted-checkout URL.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::checkout::{CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::error::{PaymentError, Result};

/// Mock gateway that never leaves the process
#[derive(Default)]
pub struct MockPaymentGateway {
    requests: Mutex<Vec<CheckoutRequest>>,
    fail_with: Option<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose every call fails like an unreachable provider
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        if let Some(message) = &self.fail_with {
            return Err(PaymentError::Stripe(message.clone()));
        }

        let id = format!("cs_test_{}", uuid::Uuid::new_v4().simple());
        let checkout_url = format!("https://checkout.mock.test/pay/{id}");
        self.requests.lock().await.push(request);

        Ok(CheckoutSession { id, checkout_url })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
