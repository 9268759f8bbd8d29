//! Document Store Trait

use async_trait::async_trait;

use crate::document::{Document, Filter};
use crate::error::Result;

/// Keyed document store over named collections (Strategy pattern)
///
/// Implementations stamp `_id`, `created_at` and `updated_at` themselves,
/// using their own clock. Every operation touches at most one document
/// atomically; there are no multi-document transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return its generated id
    async fn create(&self, collection: &str, doc: Document) -> Result<String>;

    /// First document matching the filter
    async fn get(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;

    /// Up to `limit` matching documents in insertion order
    async fn list(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Document>>;

    /// Merge `patch` into the first matching document.
    ///
    /// Returns the number of documents updated (0 or 1).
    async fn update(&self, collection: &str, filter: &Filter, patch: Document) -> Result<u64>;

    /// Names of collections holding at least one document
    async fn collections(&self) -> Result<Vec<String>>;

    /// Check that the backend answers
    async fn ping(&self) -> Result<()>;

    /// Flush and release the backend at shutdown
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for diagnostics
    fn backend(&self) -> &'static str;
}
