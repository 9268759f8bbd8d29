//! Stripe Checkout Integration
//!
//! Implements the "Stripe Checkout (Hosted)" approach: the flame page is
//! paid for on Stripe's hosted page and Stripe redirects back afterwards.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentIntentData, Currency,
};

use crate::error::{PaymentError, Result};
use crate::tier::Tier;

/// Metadata key carrying the flame id through the provider
pub const METADATA_FLAME_ID: &str = "flame_id";

/// Metadata key carrying the purchased tier through the provider
pub const METADATA_TIER: &str = "tier";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hosted-checkout provider (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a one-time payment session and return the hosted page URL
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Request to create a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Amount in minor units (cents)
    pub amount_cents: i64,

    /// ISO currency code, lower-case
    pub currency: String,

    /// Line item label shown on the hosted page
    pub product_label: String,

    /// Opaque metadata echoed back in webhook events
    pub metadata: HashMap<String, String>,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Checkout for one flame at the tier's list price
    pub fn for_flame(
        flame_id: &str,
        tier: Tier,
        currency: &str,
        success_url: String,
        cancel_url: String,
    ) -> Self {
        let pricing = tier.pricing();
        let metadata = HashMap::from([
            (METADATA_FLAME_ID.to_string(), flame_id.to_string()),
            (METADATA_TIER.to_string(), tier.as_str().to_string()),
        ]);

        Self {
            amount_cents: pricing.cents,
            currency: currency.to_ascii_lowercase(),
            product_label: pricing.name.to_string(),
            metadata,
            success_url,
            cancel_url,
        }
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider session ID
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    timeout: Duration,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self::new(&secret_key))
    }

    /// Bound every provider call
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the underlying Stripe client
    pub const fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let currency = stripe_currency(&request.currency)?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.allow_promotion_codes = Some(true);
        params.metadata = Some(request.metadata.clone());

        // Refund events are charge-scoped; copy the metadata onto the
        // payment intent so they still identify the flame.
        params.payment_intent_data = Some(CreateCheckoutSessionPaymentIntentData {
            metadata: Some(request.metadata.clone()),
            ..Default::default()
        });

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(request.amount_cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_label.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = tokio::time::timeout(
            self.timeout,
            StripeCheckoutSession::create(&self.client, params),
        )
        .await
        .map_err(|_| PaymentError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        tracing::info!(
            session_id = %session.id,
            amount_cents = request.amount_cents,
            "Created Stripe checkout session"
        );

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
        })
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

fn stripe_currency(code: &str) -> Result<Currency> {
    match code.to_ascii_lowercase().as_str() {
        "usd" => Ok(Currency::USD),
        "eur" => Ok(Currency::EUR),
        "gbp" => Ok(Currency::GBP),
        "cad" => Ok(Currency::CAD),
        "aud" => Ok(Currency::AUD),
        _ => Err(PaymentError::UnsupportedCurrency(code.to_string())),
    }
}
