//! # flame-payments
//!
//! Hosted checkout and webhook verification for eternal-flame.
//!
//! ## Stripe Checkout (Hosted)
//!
//! **Flow:** Create page → Redirect to Stripe's hosted page → Redirect back
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Frontend   │────▶│  Stripe Hosted  │────▶│  Frontend   │
//! │  (create)   │     │  Checkout Page  │     │  (success)  │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//!                              │
//!                              ▼ signed webhook (out of band)
//!                     ┌─────────────────┐
//!                     │  flame-server   │──▶ payment_status = paid
//!                     └─────────────────┘
//! ```
//!
//! The redirect back to the frontend proves nothing. Only a webhook whose
//! `Stripe-Signature` verifies against the signing secret may change the
//! payment state of a flame.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flame_payments::{CheckoutRequest, PaymentGateway, StripeClient, Tier, WebhookVerifier};
//!
//! let gateway = StripeClient::from_env()?;
//! let session = gateway
//!     .create_session(CheckoutRequest::for_flame(
//!         &flame_id,
//!         Tier::Premium,
//!         "usd",
//!         "https://flame.example/success".into(),
//!         "https://flame.example/cancel".into(),
//!     ))
//!     .await?;
//!
//! // Redirect user to: session.checkout_url
//!
//! // Later, in the webhook handler:
//! let verifier = WebhookVerifier::from_env()?;
//! let event = verifier.verify(&raw_body, signature_header)?;
//! ```

mod checkout;
mod error;
mod mock;
mod tier;
mod webhook;

pub use checkout::{
    CheckoutRequest, CheckoutSession, METADATA_FLAME_ID, METADATA_TIER, PaymentGateway,
    StripeClient,
};
pub use error::{PaymentError, Result};
pub use mock::MockPaymentGateway;
pub use tier::{Tier, TierPricing};
pub use webhook::{
    DEFAULT_TOLERANCE_SECS, PaymentMetadata, SIGNATURE_HEADER, VerifiedEvent, WebhookEvent,
    WebhookVerifier, construct_event, sign_payload,
};
