//! # flame-store
//!
//! Thin adapter over a keyed document store with named collections of
//! schemaless JSON documents.
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────────────┐
//! │  FlameService    │      │  Arc<dyn DocumentStore>  │
//! │  FlameDirectory  │─────▶│  ┌────────┐ ┌─────────┐  │
//! └──────────────────┘      │  │ memory │ │ sqlite  │  │
//!                           │  └────────┘ └─────────┘  │
//!                           └──────────────────────────┘
//! ```
//!
//! Every backend stamps `created_at` / `updated_at` with its own clock on
//! create and update; caller-supplied values for those keys never survive.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flame_store::{DocumentStore, Filter, MemoryDocumentStore};
//!
//! let store = MemoryDocumentStore::new();
//! let id = store.create("flame", doc).await?;
//! let flame = store.get("flame", &Filter::by_id(&id)).await?;
//! ```

mod document;
mod error;
mod memory;
mod sqlite;
mod store;

pub use document::{CREATED_AT_FIELD, Document, Filter, ID_FIELD, UPDATED_AT_FIELD};
pub use error::{Result, StoreError};
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;
pub use store::DocumentStore;
