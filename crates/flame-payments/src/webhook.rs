//! Stripe Webhook Verification
//!
//! Verifies the `Stripe-Signature` header over the raw request body and
//! parses the handful of event types the flame lifecycle reacts to.
//!
//! The header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]` and each `v1`
//! is `HMAC-SHA256(secret, "<t>.<raw body>")`. Verification must run over
//! the bytes exactly as received: re-serialized JSON does not match.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

use crate::checkout::{METADATA_FLAME_ID, METADATA_TIER};
use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted age (and clock skew) of a signed event
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Payment metadata echoed back by the provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentMetadata {
    pub flame_id: Option<String>,
    pub tier: Option<String>,
}

impl PaymentMetadata {
    fn from_map(map: Option<HashMap<String, String>>) -> Self {
        let mut map = map.unwrap_or_default();
        Self {
            flame_id: map.remove(METADATA_FLAME_ID).filter(|id| !id.is_empty()),
            tier: map.remove(METADATA_TIER).filter(|tier| !tier.is_empty()),
        }
    }
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Checkout finished. Delayed payment methods complete with
    /// `payment_status = "unpaid"` and settle later.
    CheckoutCompleted {
        session_id: String,
        payment_status: Option<String>,
        metadata: PaymentMetadata,
    },

    /// Delayed payment for a completed checkout settled
    AsyncPaymentSucceeded {
        session_id: String,
        metadata: PaymentMetadata,
    },

    /// Delayed payment for a completed checkout failed
    AsyncPaymentFailed {
        session_id: String,
        metadata: PaymentMetadata,
    },

    /// Charge refunded (metadata copied from the payment intent)
    ChargeRefunded {
        charge_id: String,
        metadata: PaymentMetadata,
    },

    /// Unhandled event type
    Other { event_type: String },
}

impl WebhookEvent {
    /// Whether the money for this checkout is actually collected
    pub fn is_paid(&self) -> bool {
        match self {
            Self::CheckoutCompleted { payment_status, .. } => matches!(
                payment_status.as_deref(),
                None | Some("paid" | "no_payment_required")
            ),
            Self::AsyncPaymentSucceeded { .. } => true,
            _ => false,
        }
    }

    pub const fn metadata(&self) -> Option<&PaymentMetadata> {
        match self {
            Self::CheckoutCompleted { metadata, .. }
            | Self::AsyncPaymentSucceeded { metadata, .. }
            | Self::AsyncPaymentFailed { metadata, .. }
            | Self::ChargeRefunded { metadata, .. } => Some(metadata),
            Self::Other { .. } => None,
        }
    }
}

/// Authenticated event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedEvent {
    /// Provider event id (stable across redeliveries)
    pub id: String,

    /// Provider event type, e.g. `checkout.session.completed`
    pub event_type: String,

    pub event: WebhookEvent,
}

/// Webhook signature verifier
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .map(Self::new)
            .ok_or_else(|| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))
    }

    #[must_use]
    pub const fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify signature and parse event
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<VerifiedEvent> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Verify against an explicit clock (unix seconds)
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<VerifiedEvent> {
        let header = SignatureHeader::parse(signature_header)?;

        if now.abs_diff(header.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(PaymentError::WebhookSignature(
                "timestamp outside tolerance".into(),
            ));
        }

        let mac = signed_payload_mac(&self.secret, header.timestamp, payload)?;
        let matched = header
            .signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok());

        if !matched {
            return Err(PaymentError::WebhookSignature(
                "no signature matches the payload".into(),
            ));
        }

        parse_event(payload)
    }
}

/// Verify a webhook with the given shared secret
pub fn construct_event(payload: &[u8], signature_header: &str, secret: &str) -> Result<VerifiedEvent> {
    WebhookVerifier::new(secret).verify(payload, signature_header)
}

/// Produce a `Stripe-Signature` header value for a payload.
///
/// Used to replay captured events against a local server.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::Config("invalid webhook secret".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                // Undecodable entries cannot match; skip them
                "v1" => signatures.extend(hex::decode(value).ok()),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(PaymentError::WebhookSignature("missing v1 signature".into()));
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    #[serde(default)]
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

fn parse_event(payload: &[u8]) -> Result<VerifiedEvent> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))?;
    let object = raw.data.object;

    let event = match raw.event_type.as_str() {
        "checkout.session.completed" => WebhookEvent::CheckoutCompleted {
            session_id: object.id,
            payment_status: object.payment_status,
            metadata: PaymentMetadata::from_map(object.metadata),
        },
        "checkout.session.async_payment_succeeded" => WebhookEvent::AsyncPaymentSucceeded {
            session_id: object.id,
            metadata: PaymentMetadata::from_map(object.metadata),
        },
        "checkout.session.async_payment_failed" => WebhookEvent::AsyncPaymentFailed {
            session_id: object.id,
            metadata: PaymentMetadata::from_map(object.metadata),
        },
        "charge.refunded" => WebhookEvent::ChargeRefunded {
            charge_id: object.id,
            metadata: PaymentMetadata::from_map(object.metadata),
        },
        other => WebhookEvent::Other {
            event_type: other.to_string(),
        },
    };

    Ok(VerifiedEvent {
        id: raw.id,
        event_type: raw.event_type,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_760_000_000;

    fn completed_payload(flame_id: &str) -> Vec<u8> {
        serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_1",
                "object": "checkout.session",
                "payment_status": "paid",
                "metadata": {"flame_id": flame_id, "tier": "premium"}
            }}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_valid_signature() {
        let payload = completed_payload("f1");
        let header = sign_payload(&payload, SECRET, NOW).unwrap();

        let verified = WebhookVerifier::new(SECRET)
            .verify_at(&payload, &header, NOW + 10)
            .unwrap();

        assert_eq!(verified.id, "evt_1");
        assert_eq!(verified.event_type, "checkout.session.completed");
        assert!(verified.event.is_paid());
        assert_eq!(
            verified.event.metadata(),
            Some(&PaymentMetadata {
                flame_id: Some("f1".into()),
                tier: Some("premium".into()),
            })
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = completed_payload("f1");
        let header = sign_payload(&payload, "wrong_secret", NOW).unwrap();

        let result = WebhookVerifier::new(SECRET).verify_at(&payload, &header, NOW);
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }

    #[test]
    fn test_modified_payload_rejected() {
        let header = sign_payload(&completed_payload("f1"), SECRET, NOW).unwrap();

        let result =
            WebhookVerifier::new(SECRET).verify_at(&completed_payload("f2"), &header, NOW);
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }

    #[test]
    fn test_reserialized_payload_rejected() {
        let payload = completed_payload("f1");
        let header = sign_payload(&payload, SECRET, NOW).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();

        let result = WebhookVerifier::new(SECRET).verify_at(&pretty, &header, NOW);
        assert!(result.is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = completed_payload("f1");
        let header = sign_payload(&payload, SECRET, NOW - 600).unwrap();

        let result = WebhookVerifier::new(SECRET).verify_at(&payload, &header, NOW);
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }

    #[test]
    fn test_extreme_timestamps_rejected() {
        let verifier = WebhookVerifier::new(SECRET);

        for header in [
            "t=-9223372036854775808,v1=00",
            "t=9223372036854775807,v1=00",
        ] {
            let result = verifier.verify_at(b"{}", header, NOW);
            assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
        }

        let result = verifier.verify_at(b"{}", "t=0,v1=00", i64::MIN);
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }

    #[test]
    fn test_malformed_headers_rejected() {
        let payload = completed_payload("f1");
        let verifier = WebhookVerifier::new(SECRET);

        for header in ["", "garbage", "t=1760000000", "v1=abcd", "t=abc,v1=00"] {
            assert!(
                verifier.verify_at(&payload, header, NOW).is_err(),
                "header {header:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_any_matching_v1_accepted() {
        let payload = completed_payload("f1");
        let good = sign_payload(&payload, SECRET, NOW).unwrap();
        let good_sig = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={good_sig}", "00".repeat(32));

        assert!(WebhookVerifier::new(SECRET).verify_at(&payload, &header, NOW).is_ok());
    }

    #[test]
    fn test_signed_garbage_is_parse_error() {
        let payload = b"not json";
        let header = sign_payload(payload, SECRET, NOW).unwrap();

        let result = WebhookVerifier::new(SECRET).verify_at(payload, &header, NOW);
        assert!(matches!(result, Err(PaymentError::WebhookParse(_))));
    }

    #[test]
    fn test_event_kinds() {
        let parse = |event_type: &str, object: serde_json::Value| {
            let payload = serde_json::json!({
                "id": "evt", "type": event_type, "data": {"object": object}
            })
            .to_string();
            parse_event(payload.as_bytes()).unwrap().event
        };

        let delayed = parse(
            "checkout.session.completed",
            serde_json::json!({"id": "cs", "payment_status": "unpaid", "metadata": {"flame_id": "f1"}}),
        );
        assert!(!delayed.is_paid());

        let settled = parse(
            "checkout.session.async_payment_succeeded",
            serde_json::json!({"id": "cs", "metadata": {"flame_id": "f1"}}),
        );
        assert!(settled.is_paid());

        let refunded = parse(
            "charge.refunded",
            serde_json::json!({"id": "ch_1", "metadata": {"flame_id": "f1"}}),
        );
        assert!(matches!(refunded, WebhookEvent::ChargeRefunded { ref charge_id, .. } if charge_id == "ch_1"));

        let no_metadata = parse("checkout.session.completed", serde_json::json!({"id": "cs", "metadata": null}));
        assert_eq!(no_metadata.metadata(), Some(&PaymentMetadata::default()));

        let other = parse("customer.created", serde_json::json!({"id": "cus_1", "email": "x"}));
        assert_eq!(
            other,
            WebhookEvent::Other {
                event_type: "customer.created".into()
            }
        );
    }

    #[test]
    fn test_construct_event_uses_current_time() {
        let payload = completed_payload("f1");
        let header = sign_payload(&payload, SECRET, chrono::Utc::now().timestamp()).unwrap();

        assert!(construct_event(&payload, &header, SECRET).is_ok());
    }
}
