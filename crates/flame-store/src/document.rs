//! Documents and Filters
//!
//! A document is an untyped JSON object. The store owns three keys on every
//! document: `_id`, `created_at` and `updated_at`. Callers may put anything
//! else in a document, but values they supply for those keys are replaced.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Schemaless document
pub type Document = Map<String, Value>;

/// Storage-internal identifier key
pub const ID_FIELD: &str = "_id";

/// Creation timestamp key (RFC 3339, UTC)
pub const CREATED_AT_FIELD: &str = "created_at";

/// Last-update timestamp key (RFC 3339, UTC)
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Conjunction of field equality conditions
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every document
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on the storage-internal id
    pub fn by_id(id: &str) -> Self {
        Self::new().eq(ID_FIELD, id)
    }

    /// Add an equality condition
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    /// Check a document against every condition
    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }

    /// Field and expected value of each condition, in insertion order
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.conditions
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }
}

pub(crate) fn timestamp(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Prepare a document for insertion: assign the id and stamp both timestamps.
pub(crate) fn stamp_new(doc: &mut Document, id: &str, now: DateTime<Utc>) {
    let stamp = timestamp(now);
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    doc.insert(CREATED_AT_FIELD.to_string(), stamp.clone());
    doc.insert(UPDATED_AT_FIELD.to_string(), stamp);
}

/// Merge a patch into a stored document.
///
/// Top-level keys of the patch replace the stored values. The id and the
/// creation timestamp cannot be patched; `updated_at` always takes `now`.
pub(crate) fn apply_patch(doc: &mut Document, patch: Document, now: DateTime<Utc>) {
    for (key, value) in patch {
        if key == ID_FIELD || key == CREATED_AT_FIELD || key == UPDATED_AT_FIELD {
            continue;
        }
        doc.insert(key, value);
    }
    doc.insert(UPDATED_AT_FIELD.to_string(), timestamp(now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let d = doc(json!({"slug": "a", "payment_status": "paid", "allow_public_gallery": true}));

        assert!(Filter::new().matches(&d));
        assert!(Filter::new().eq("slug", "a").matches(&d));
        assert!(
            Filter::new()
                .eq("payment_status", "paid")
                .eq("allow_public_gallery", true)
                .matches(&d)
        );
        assert!(!Filter::new().eq("slug", "a").eq("payment_status", "unpaid").matches(&d));
        assert!(!Filter::new().eq("missing", "x").matches(&d));
    }

    #[test]
    fn test_stamp_new_overwrites_client_timestamps() {
        let now = Utc::now();
        let mut d = doc(json!({"created_at": "1999-01-01T00:00:00Z", "_id": "spoofed"}));

        stamp_new(&mut d, "real-id", now);

        assert_eq!(d[ID_FIELD], json!("real-id"));
        assert_eq!(d[CREATED_AT_FIELD], timestamp(now));
        assert_eq!(d[UPDATED_AT_FIELD], timestamp(now));
    }

    #[test]
    fn test_apply_patch_protects_reserved_keys() {
        let created = Utc::now() - chrono::Duration::hours(1);
        let now = Utc::now();
        let mut d = doc(json!({"payment_status": "unpaid"}));
        stamp_new(&mut d, "id-1", created);

        apply_patch(
            &mut d,
            doc(json!({
                "payment_status": "paid",
                "_id": "other",
                "created_at": "1999-01-01T00:00:00Z",
                "updated_at": "1999-01-01T00:00:00Z",
            })),
            now,
        );

        assert_eq!(d["payment_status"], json!("paid"));
        assert_eq!(d[ID_FIELD], json!("id-1"));
        assert_eq!(d[CREATED_AT_FIELD], timestamp(created));
        assert_eq!(d[UPDATED_AT_FIELD], timestamp(now));
    }
}
