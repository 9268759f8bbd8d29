//! Application State

use std::sync::Arc;

use flame_core::{FlameDirectory, FlameService};
use flame_store::DocumentStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Flame lifecycle (create, checkout, webhooks, replies)
    pub service: Arc<FlameService>,

    /// Read paths (slug, gallery, admin)
    pub directory: Arc<FlameDirectory>,

    /// Store handle for diagnostics
    pub store: Arc<dyn DocumentStore>,

    /// Database name reported by `/test`
    pub database_name: String,
}
