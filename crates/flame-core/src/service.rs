//! Flame Lifecycle Service
//!
//! Creates flames, opens checkout sessions for them and reconciles payment
//! state from verified provider webhooks.
//!
//! ```text
//!   unpaid ──(checkout completed & paid)──▶ paid ──(charge refunded)──▶ refunded
//!     │            (async payment ok)        ▲
//!     └──(async payment failed)──▶ failed ───┘ (later successful payment)
//! ```
//!
//! Only a webhook that passes signature verification moves a flame along
//! these edges. Request bodies can never set `payment_status`.

use chrono::Utc;
use flame_payments::{
    CheckoutRequest, PaymentGateway, PaymentMetadata, Tier, VerifiedEvent, WebhookEvent,
    WebhookVerifier,
};
use flame_store::{Document, DocumentStore, Filter, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::challenge::ChallengeVerifier;
use crate::error::{FlameError, Result};
use crate::model::{FLAME_COLLECTION, Flame, PaymentStatus, REPLY_COLLECTION, Reply};
use crate::slug;
use crate::validation::{NewFlame, NewReply};

/// Body key carrying the challenge token on flame creation
pub const CHALLENGE_TOKEN_FIELD: &str = "captcha_token";

/// Deployment settings used to build checkout redirects
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Public frontend base URL, without trailing slash
    pub frontend_url: String,

    /// Charge currency, lower-case ISO code
    pub currency: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".into(),
            currency: "usd".into(),
        }
    }
}

/// Returned by [`FlameService::create_flame`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedFlame {
    pub id: String,
    pub slug: String,
    pub payment_status: PaymentStatus,
}

/// Returned by [`FlameService::create_checkout_session`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutRedirect {
    /// Provider session id
    pub id: String,

    /// Hosted checkout page
    pub url: String,
}

/// What a verified webhook did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Flame moved to a new payment state
    Updated(PaymentStatus),

    /// Event already applied (redelivery)
    Unchanged,

    /// Event acknowledged without touching any flame
    Ignored,
}

pub struct FlameService {
    store: Arc<dyn DocumentStore>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    webhooks: Option<WebhookVerifier>,
    challenge: Arc<dyn ChallengeVerifier>,
    settings: ServiceSettings,
}

impl FlameService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        challenge: Arc<dyn ChallengeVerifier>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            gateway: None,
            webhooks: None,
            challenge,
            settings,
        }
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    #[must_use]
    pub fn with_webhook_verifier(mut self, verifier: WebhookVerifier) -> Self {
        self.webhooks = Some(verifier);
        self
    }

    pub const fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Validate and persist a new flame in the `unpaid` state
    pub async fn create_flame(&self, body: Value) -> Result<CreatedFlame> {
        let mut body = body;
        let token = match body.as_object_mut() {
            Some(fields) => fields
                .remove(CHALLENGE_TOKEN_FIELD)
                .and_then(|v| v.as_str().map(str::to_string)),
            None => None,
        };

        if !self.challenge.verify(token.as_deref()).await {
            tracing::info!("Flame creation rejected by challenge");
            return Err(FlameError::Verification(
                "Human verification failed".into(),
            ));
        }

        let input = NewFlame::parse(body)?;
        let slug = slug::generate(&input.recipient_name, &input.sender_name);
        let doc = Flame::new_document(&input, &slug);
        let id = self.store.create(FLAME_COLLECTION, doc).await?;

        tracing::info!(flame_id = %id, slug = %slug, tier = %input.tier, "Flame created");

        Ok(CreatedFlame {
            id,
            slug,
            payment_status: PaymentStatus::Unpaid,
        })
    }

    /// Open a hosted checkout for a flame.
    ///
    /// Without `tier` the flame's own tier is charged.
    pub async fn create_checkout_session(
        &self,
        flame_id: &str,
        tier: Option<&str>,
    ) -> Result<CheckoutRedirect> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| FlameError::Config("Payments are not configured".into()))?;

        let flame = self
            .find_flame(&Filter::by_id(flame_id))
            .await?
            .ok_or(FlameError::NotFound("Flame"))?;

        let tier = match tier {
            Some(raw) => raw.parse::<Tier>()?,
            None => flame.tier,
        };

        let frontend = self.settings.frontend_url.trim_end_matches('/');
        let request = CheckoutRequest::for_flame(
            &flame.id,
            tier,
            &self.settings.currency,
            format!(
                "{frontend}/success?flame={}&session_id={{CHECKOUT_SESSION_ID}}",
                flame.slug
            ),
            format!("{frontend}/cancel?flame={}", flame.slug),
        );

        let session = gateway.create_session(request).await.map_err(|e| {
            tracing::error!(flame_id = %flame.id, error = %e, "Checkout session failed");
            FlameError::from(e)
        })?;

        tracing::info!(
            flame_id = %flame.id,
            tier = %tier,
            session_id = %session.id,
            gateway = gateway.name(),
            "Checkout session created"
        );

        Ok(CheckoutRedirect {
            id: session.id,
            url: session.checkout_url,
        })
    }

    /// Verify and apply a payment provider webhook.
    ///
    /// Every well-signed event is acknowledged, including ones naming an
    /// unknown flame. Redeliveries leave the flame unchanged.
    pub async fn handle_payment_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let verifier = self
            .webhooks
            .as_ref()
            .ok_or_else(|| FlameError::Config("Webhook secret is not configured".into()))?;

        let signature = signature.ok_or_else(|| {
            tracing::warn!("Webhook without signature header");
            FlameError::Verification("Missing signature".into())
        })?;

        let event = verifier.verify(payload, signature).map_err(|e| {
            tracing::warn!(error = %e, "Webhook verification failed");
            FlameError::from(e)
        })?;

        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Webhook verified");
        self.apply_event(&event).await
    }

    async fn apply_event(&self, event: &VerifiedEvent) -> Result<WebhookOutcome> {
        match &event.event {
            WebhookEvent::CheckoutCompleted { metadata, .. }
            | WebhookEvent::AsyncPaymentSucceeded { metadata, .. }
                if event.event.is_paid() =>
            {
                self.mark_paid(event, metadata).await
            }
            WebhookEvent::CheckoutCompleted { payment_status, .. } => {
                tracing::info!(
                    event_id = %event.id,
                    payment_status = ?payment_status,
                    "Checkout completed without payment yet"
                );
                Ok(WebhookOutcome::Ignored)
            }
            WebhookEvent::AsyncPaymentFailed { metadata, .. } => {
                self.transition(event, metadata, &[PaymentStatus::Unpaid], PaymentStatus::Failed)
                    .await
            }
            WebhookEvent::ChargeRefunded { metadata, .. } => {
                self.transition(event, metadata, &[PaymentStatus::Paid], PaymentStatus::Refunded)
                    .await
            }
            WebhookEvent::AsyncPaymentSucceeded { .. } | WebhookEvent::Other { .. } => {
                tracing::debug!(event_type = %event.event_type, "Webhook event ignored");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn mark_paid(
        &self,
        event: &VerifiedEvent,
        metadata: &PaymentMetadata,
    ) -> Result<WebhookOutcome> {
        let Some(flame) = self.event_flame(event, metadata).await? else {
            return Ok(WebhookOutcome::Ignored);
        };

        let tier = match metadata.tier.as_deref().map(str::parse::<Tier>) {
            Some(Ok(tier)) => tier,
            Some(Err(_)) => {
                tracing::warn!(event_id = %event.id, tier = ?metadata.tier, "Unknown tier in webhook metadata");
                flame.tier
            }
            None => flame.tier,
        };

        match flame.payment_status {
            PaymentStatus::Paid if flame.tier == tier => {
                tracing::debug!(flame_id = %flame.id, "Flame already paid");
                return Ok(WebhookOutcome::Unchanged);
            }
            PaymentStatus::Refunded => {
                tracing::warn!(flame_id = %flame.id, event_id = %event.id, "Payment event for a refunded flame");
                return Ok(WebhookOutcome::Ignored);
            }
            _ => {}
        }

        let mut patch = Document::new();
        patch.insert("payment_status".into(), PaymentStatus::Paid.as_str().into());
        patch.insert("tier".into(), tier.as_str().into());
        patch.insert("watermark".into(), tier.watermarked().into());
        let filter = Filter::by_id(&flame.id)
            .eq("payment_status", flame.payment_status.as_str())
            .eq("tier", flame.tier.as_str());
        let updated = self.store.update(FLAME_COLLECTION, &filter, patch).await?;

        if updated == 0 {
            tracing::warn!(flame_id = %flame.id, event_id = %event.id, "Flame changed while marking paid");
            return Ok(WebhookOutcome::Unchanged);
        }

        tracing::info!(flame_id = %flame.id, tier = %tier, event_id = %event.id, "Flame marked paid");
        Ok(WebhookOutcome::Updated(PaymentStatus::Paid))
    }

    async fn transition(
        &self,
        event: &VerifiedEvent,
        metadata: &PaymentMetadata,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<WebhookOutcome> {
        let Some(flame) = self.event_flame(event, metadata).await? else {
            return Ok(WebhookOutcome::Ignored);
        };

        if flame.payment_status == to {
            return Ok(WebhookOutcome::Unchanged);
        }
        if !from.contains(&flame.payment_status) {
            tracing::warn!(
                flame_id = %flame.id,
                current = %flame.payment_status,
                target = %to,
                "Ignoring out-of-order payment event"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        let mut patch = Document::new();
        patch.insert("payment_status".into(), to.as_str().into());
        let filter = Filter::by_id(&flame.id).eq("payment_status", flame.payment_status.as_str());
        let updated = self.store.update(FLAME_COLLECTION, &filter, patch).await?;

        if updated == 0 {
            // Lost a race with another delivery
            return Ok(WebhookOutcome::Unchanged);
        }

        tracing::info!(flame_id = %flame.id, status = %to, event_id = %event.id, "Flame payment status changed");
        Ok(WebhookOutcome::Updated(to))
    }

    async fn event_flame(
        &self,
        event: &VerifiedEvent,
        metadata: &PaymentMetadata,
    ) -> Result<Option<Flame>> {
        let Some(flame_id) = metadata.flame_id.as_deref() else {
            tracing::warn!(event_id = %event.id, event_type = %event.event_type, "Webhook without flame_id metadata");
            return Ok(None);
        };

        let flame = self.find_flame(&Filter::by_id(flame_id)).await?;
        if flame.is_none() {
            tracing::warn!(event_id = %event.id, flame_id, "Webhook for unknown flame");
        }
        Ok(flame)
    }

    /// Leave a reply on a premium flame and return the reply id
    pub async fn reply_to_flame(&self, flame_id: &str, body: Value) -> Result<String> {
        let flame = self
            .find_flame(&Filter::by_id(flame_id))
            .await?
            .ok_or(FlameError::NotFound("Flame"))?;

        if !flame.tier.allows_replies() {
            return Err(FlameError::Forbidden(
                "Replies are only available for premium flames".into(),
            ));
        }

        let reply = NewReply::parse(body)?;
        let id = self
            .store
            .create(REPLY_COLLECTION, Reply::new_document(&flame.id, &reply))
            .await?;

        tracing::info!(flame_id = %flame.id, reply_id = %id, "Reply stored");
        Ok(id)
    }

    async fn find_flame(&self, filter: &Filter) -> Result<Option<Flame>> {
        self.store
            .get(FLAME_COLLECTION, filter)
            .await?
            .map(|doc| Flame::from_document(doc).map_err(StoreError::from))
            .transpose()
            .map_err(FlameError::from)
    }
}
