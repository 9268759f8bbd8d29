//! Read Access
//!
//! Public slug lookup, the opt-in gallery and the admin listing. These read
//! the store directly; nothing here writes.

use chrono::Utc;
use flame_store::{DocumentStore, Filter, StoreError};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::{FlameError, Result};
use crate::model::{FLAME_COLLECTION, Flame, PaymentStatus};

/// Gallery size. There is no cursor; this is the whole gallery.
pub const GALLERY_LIMIT: usize = 100;

/// Admin listing size
pub const ADMIN_LIMIT: usize = 200;

pub struct FlameDirectory {
    store: Arc<dyn DocumentStore>,
    admin_key: Option<String>,
}

impl FlameDirectory {
    /// `admin_key` of `None` (or empty) locks the admin listing entirely
    pub fn new(store: Arc<dyn DocumentStore>, admin_key: Option<String>) -> Self {
        Self {
            store,
            admin_key: admin_key.filter(|k| !k.is_empty()),
        }
    }

    /// Flame by public slug, sealed until its scheduled reveal
    pub async fn by_slug(&self, slug: &str) -> Result<Flame> {
        let doc = self
            .store
            .get(FLAME_COLLECTION, &Filter::new().eq("slug", slug))
            .await?
            .ok_or(FlameError::NotFound("Flame"))?;

        Ok(decode(doc)?.public_view(Utc::now()))
    }

    /// Paid flames whose creators opted into the public gallery
    pub async fn gallery(&self) -> Result<Vec<Flame>> {
        let filter = Filter::new()
            .eq("allow_public_gallery", true)
            .eq("payment_status", PaymentStatus::Paid.as_str());
        let now = Utc::now();

        self.list(&filter, GALLERY_LIMIT)
            .await
            .map(|flames| flames.into_iter().map(|f| f.public_view(now)).collect())
    }

    /// Every paid flame with full content, for the admin holding the key
    pub async fn paid_flames(&self, provided_key: Option<&str>) -> Result<Vec<Flame>> {
        verify_admin_key(self.admin_key.as_deref(), provided_key)?;

        let filter = Filter::new().eq("payment_status", PaymentStatus::Paid.as_str());
        let now = Utc::now();

        self.list(&filter, ADMIN_LIMIT)
            .await
            .map(|flames| flames.into_iter().map(|f| f.with_reveal_state(now)).collect())
    }

    async fn list(&self, filter: &Filter, limit: usize) -> Result<Vec<Flame>> {
        self.store
            .list(FLAME_COLLECTION, filter, limit)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}

fn decode(doc: flame_store::Document) -> Result<Flame> {
    Flame::from_document(doc).map_err(|e| FlameError::Store(StoreError::from(e)))
}

/// Compare the admin key in constant time.
///
/// Fails `Unauthorized` when no key is configured, none is provided, or the
/// keys differ.
pub fn verify_admin_key(expected: Option<&str>, provided: Option<&str>) -> Result<()> {
    let (Some(expected), Some(provided)) = (expected, provided) else {
        return Err(FlameError::Unauthorized);
    };

    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.is_empty() || expected.len() != provided.len() {
        return Err(FlameError::Unauthorized);
    }

    if bool::from(expected.ct_eq(provided)) {
        Ok(())
    } else {
        Err(FlameError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::StaticChallenge;
    use crate::service::{FlameService, ServiceSettings};
    use chrono::Duration;
    use flame_payments::{WebhookVerifier, sign_payload};
    use flame_store::MemoryDocumentStore;
    use serde_json::{Value, json};

    const SECRET: &str = "whsec_directory";
    const ADMIN_KEY: &str = "admin-key-123";

    fn setup() -> (FlameService, FlameDirectory) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let service = FlameService::new(
            store.clone(),
            Arc::new(StaticChallenge(true)),
            ServiceSettings::default(),
        )
        .with_webhook_verifier(WebhookVerifier::new(SECRET));
        let directory = FlameDirectory::new(store, Some(ADMIN_KEY.into()));
        (service, directory)
    }

    fn body(name: &str, public: bool) -> Value {
        json!({
            "recipient_name": name,
            "sender_name": "Sam",
            "message": "We miss you dearly and always will",
            "allow_public_gallery": public
        })
    }

    async fn pay(service: &FlameService, flame_id: &str) {
        let payload = json!({
            "id": "evt", "type": "checkout.session.completed",
            "data": {"object": {"id": "cs", "payment_status": "paid", "metadata": {"flame_id": flame_id}}}
        })
        .to_string();
        let header = sign_payload(payload.as_bytes(), SECRET, Utc::now().timestamp()).unwrap();
        service
            .handle_payment_webhook(payload.as_bytes(), Some(&header))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_slug_lookup() {
        let (service, directory) = setup();
        let created = service.create_flame(body("Alex", false)).await.unwrap();

        let flame = directory.by_slug(&created.slug).await.unwrap();
        assert_eq!(flame.id, created.id);
        assert_eq!(flame.recipient_name, "Alex");
        assert!(flame.is_revealed);

        assert!(matches!(
            directory.by_slug("alex-sam-nope").await,
            Err(FlameError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scheduled_flame_sealed() {
        let (service, directory) = setup();
        let mut input = body("Alex", false);
        input["schedule_date"] = json!((Utc::now() + Duration::days(7)).to_rfc3339());
        let created = service.create_flame(input).await.unwrap();

        let flame = directory.by_slug(&created.slug).await.unwrap();
        assert!(!flame.is_revealed);
        assert!(flame.message.is_empty());
    }

    #[tokio::test]
    async fn test_gallery_public_and_paid_only() {
        let (service, directory) = setup();
        let public_paid = service.create_flame(body("Ana", true)).await.unwrap();
        let public_unpaid = service.create_flame(body("Ben", true)).await.unwrap();
        let private_paid = service.create_flame(body("Cy", false)).await.unwrap();
        pay(&service, &public_paid.id).await;
        pay(&service, &private_paid.id).await;

        let gallery = directory.gallery().await.unwrap();
        let ids: Vec<&str> = gallery.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec![public_paid.id.as_str()]);
        assert!(!ids.contains(&public_unpaid.id.as_str()));
    }

    #[tokio::test]
    async fn test_admin_listing() {
        let (service, directory) = setup();
        let paid = service.create_flame(body("Ana", false)).await.unwrap();
        service.create_flame(body("Ben", true)).await.unwrap();
        pay(&service, &paid.id).await;

        for key in [None, Some(""), Some("wrong"), Some("admin-key-12"), Some("admin-key-1234")] {
            assert!(matches!(
                directory.paid_flames(key).await,
                Err(FlameError::Unauthorized)
            ));
        }

        let flames = directory.paid_flames(Some(ADMIN_KEY)).await.unwrap();
        assert_eq!(flames.len(), 1);
        assert!(flames.iter().all(|f| f.payment_status == PaymentStatus::Paid));
    }

    #[tokio::test]
    async fn test_admin_locked_without_key() {
        let directory = FlameDirectory::new(Arc::new(MemoryDocumentStore::new()), Some(String::new()));
        assert!(matches!(
            directory.paid_flames(Some("")).await,
            Err(FlameError::Unauthorized)
        ));
    }

    #[test]
    fn test_verify_admin_key() {
        assert!(verify_admin_key(Some("k"), Some("k")).is_ok());
        assert!(verify_admin_key(Some("k"), Some("K")).is_err());
        assert!(verify_admin_key(None, Some("k")).is_err());
        assert!(verify_admin_key(Some("k"), None).is_err());
    }
}
