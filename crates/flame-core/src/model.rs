//! Domain Models
//!
//! Flames and replies as stored documents and as returned to clients. The
//! store keeps its own `_id`; it is exposed as `id` and never in any other
//! shape.

use chrono::{DateTime, Utc};
use flame_payments::Tier;
use flame_store::{Document, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::validation::{NewFlame, NewReply};

/// Collection holding flames
pub const FLAME_COLLECTION: &str = "flame";

/// Collection holding replies, keyed by `flame_id`
pub const REPLY_COLLECTION: &str = "flame_reply";

/// Payment state of a flame. Only verified provider events move it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flame page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flame {
    pub id: String,
    pub slug: String,
    pub recipient_name: String,
    pub sender_name: String,

    /// Empty while a scheduled flame is still sealed for public readers
    pub message: String,

    #[serde(default)]
    pub photos: Vec<String>,

    pub flame_color: String,
    pub tier: Tier,
    pub schedule_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub allow_public_gallery: bool,

    #[serde(default)]
    pub payment_status: PaymentStatus,

    /// Shown on every tier except premium
    pub watermark: bool,

    #[serde(default = "default_true")]
    pub is_revealed: bool,

    #[serde(default)]
    pub revealed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const fn default_true() -> bool {
    true
}

impl Flame {
    /// Stored document for a freshly validated flame.
    ///
    /// `payment_status` always starts `unpaid`; timestamps and id are left
    /// to the store.
    pub fn new_document(input: &NewFlame, slug: &str) -> Document {
        let value = json!({
            "slug": slug,
            "recipient_name": input.recipient_name,
            "sender_name": input.sender_name,
            "message": input.message,
            "photos": input.photos,
            "flame_color": input.flame_color,
            "tier": input.tier,
            "schedule_date": input.schedule_date,
            "allow_public_gallery": input.allow_public_gallery,
            "payment_status": PaymentStatus::Unpaid,
            "watermark": input.tier.watermarked(),
        });

        match value {
            Value::Object(doc) => doc,
            _ => Document::new(),
        }
    }

    /// Decode a stored document, mapping `_id` to `id`
    pub fn from_document(doc: Document) -> serde_json::Result<Self> {
        let mut doc = doc;
        if let Some(id) = doc.remove(ID_FIELD) {
            doc.insert("id".to_string(), id);
        }
        serde_json::from_value(Value::Object(doc))
    }

    /// Whether the scheduled reveal time has passed
    pub fn revealed_by(&self, now: DateTime<Utc>) -> bool {
        self.schedule_date.is_none_or(|at| at <= now)
    }

    /// Set the reveal flags for `now`
    #[must_use]
    pub fn with_reveal_state(mut self, now: DateTime<Utc>) -> Self {
        self.is_revealed = self.revealed_by(now);
        self.revealed_at = if self.is_revealed {
            self.schedule_date
        } else {
            None
        };
        self
    }

    /// Public view: reveal flags applied, content withheld until revealed
    #[must_use]
    pub fn public_view(self, now: DateTime<Utc>) -> Self {
        let mut flame = self.with_reveal_state(now);
        if !flame.is_revealed {
            flame.message.clear();
            flame.photos.clear();
        }
        flame
    }
}

/// A reply left on a premium flame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub flame_id: String,
    pub message: String,
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reply {
    pub fn new_document(flame_id: &str, input: &NewReply) -> Document {
        let mut doc = Document::new();
        doc.insert("flame_id".into(), Value::String(flame_id.to_string()));
        doc.insert("message".into(), Value::String(input.message.clone()));
        doc.insert(
            "sender_name".into(),
            input
                .sender_name
                .clone()
                .map_or(Value::Null, Value::String),
        );
        doc
    }

    pub fn from_document(doc: Document) -> serde_json::Result<Self> {
        let mut doc = doc;
        if let Some(id) = doc.remove(ID_FIELD) {
            doc.insert("id".to_string(), id);
        }
        serde_json::from_value(Value::Object(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stored(schedule_date: Option<DateTime<Utc>>) -> Document {
        let input = NewFlame {
            recipient_name: "Alex".into(),
            sender_name: "Sam".into(),
            message: "We miss you dearly and always will".into(),
            photos: vec!["https://x.io/a.png".into()],
            flame_color: "#FF4D4D".into(),
            tier: Tier::Basic,
            schedule_date,
            allow_public_gallery: true,
        };
        let mut doc = Flame::new_document(&input, "alex-sam-0123456789abcdef");
        doc.insert(ID_FIELD.into(), json!("abc"));
        doc.insert("created_at".into(), json!("2025-01-01T00:00:00.000000Z"));
        doc.insert("updated_at".into(), json!("2025-01-01T00:00:00.000000Z"));
        doc
    }

    #[test]
    fn test_new_document_starts_unpaid() {
        let doc = stored(None);
        assert_eq!(doc["payment_status"], "unpaid");
        assert_eq!(doc["watermark"], true);
        assert_eq!(doc["tier"], "basic");
    }

    #[test]
    fn test_from_document_maps_id() {
        let flame = Flame::from_document(stored(None)).unwrap();
        assert_eq!(flame.id, "abc");
        assert_eq!(flame.payment_status, PaymentStatus::Unpaid);

        let json = serde_json::to_value(&flame).unwrap();
        assert!(json.get(ID_FIELD).is_none());
        assert_eq!(json["id"], "abc");
    }

    #[test]
    fn test_sealed_until_schedule_date() {
        let now = Utc::now();
        let at = now + Duration::days(1);
        let flame = Flame::from_document(stored(Some(at))).unwrap();

        let sealed = flame.clone().public_view(now);
        assert!(!sealed.is_revealed);
        assert!(sealed.message.is_empty());
        assert!(sealed.photos.is_empty());
        assert_eq!(sealed.revealed_at, None);

        let open = flame.public_view(at + Duration::seconds(1));
        assert!(open.is_revealed);
        assert_eq!(open.revealed_at, Some(at));
        assert!(!open.message.is_empty());
    }

    #[test]
    fn test_unscheduled_always_revealed() {
        let flame = Flame::from_document(stored(None)).unwrap().public_view(Utc::now());
        assert!(flame.is_revealed);
        assert_eq!(flame.revealed_at, None);
    }
}
