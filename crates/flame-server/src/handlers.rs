//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use flame_core::{
    CheckoutRedirect, CreatedFlame, FieldViolation, Flame, FlameError, ValidationFailure,
};
use flame_payments::SIGNATURE_HEADER;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the admin shared secret
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

const DIAGNOSTIC_COLLECTIONS: usize = 10;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub time: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct DiagnosticsResponse {
    pub backend: &'static str,
    pub store: &'static str,
    pub database: String,
    pub database_name: String,
    pub collections: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    #[serde(default)]
    pub flame_id: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Serialize)]
pub struct ReplyAck {
    pub ok: bool,
    pub id: String,
}

#[derive(Serialize)]
pub struct FlameList {
    pub items: Vec<Flame>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness probe
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        time: Utc::now(),
    })
}

/// Store diagnostics
pub async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let (database, collections) = match state.store.ping().await {
        Ok(()) => match state.store.collections().await {
            Ok(mut names) => {
                names.truncate(DIAGNOSTIC_COLLECTIONS);
                ("connected".to_string(), names)
            }
            Err(e) => (format!("connected, listing failed: {e}"), Vec::new()),
        },
        Err(e) => {
            tracing::error!(error = %e, "Store ping failed");
            (format!("unavailable: {e}"), Vec::new())
        }
    };

    Json(DiagnosticsResponse {
        backend: "running",
        store: state.store.backend(),
        database,
        database_name: state.database_name.clone(),
        collections,
    })
}

/// Create a flame (always `unpaid`)
pub async fn create_flame(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<CreatedFlame>, ApiError> {
    let Json(body) = payload?;
    Ok(Json(state.service.create_flame(body).await?))
}

/// Open a hosted checkout for a flame
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Json<CheckoutRedirect>, ApiError> {
    let Json(body) = payload?;
    let flame_id = body
        .flame_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            FlameError::Validation(ValidationFailure {
                fields: vec![FieldViolation {
                    field: "flame_id".into(),
                    code: "required".into(),
                    message: "flame_id is required".into(),
                }],
            })
        })?;

    let redirect = state
        .service
        .create_checkout_session(flame_id.trim(), body.tier.as_deref())
        .await?;
    Ok(Json(redirect))
}

/// Payment provider webhook.
///
/// Takes the raw body: the signature covers the exact bytes sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    state
        .service
        .handle_payment_webhook(&body, signature)
        .await?;

    Ok(Json(WebhookAck { received: true }))
}

/// Public flame page data
pub async fn get_flame(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Flame>, ApiError> {
    Ok(Json(state.directory.by_slug(&slug).await?))
}

/// Reply to a premium flame
pub async fn reply_to_flame(
    State(state): State<AppState>,
    Path(flame_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ReplyAck>, ApiError> {
    let Json(body) = payload?;
    let id = state.service.reply_to_flame(&flame_id, body).await?;
    Ok(Json(ReplyAck { ok: true, id }))
}

/// Public gallery
pub async fn gallery(State(state): State<AppState>) -> Result<Json<FlameList>, ApiError> {
    let items = state.directory.gallery().await?;
    Ok(Json(FlameList { items }))
}

/// Admin listing of paid flames
pub async fn admin_flames(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FlameList>, ApiError> {
    let key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let items = state.directory.paid_flames(key).await.inspect_err(|_| {
        tracing::warn!("Admin listing refused");
    })?;
    Ok(Json(FlameList { items }))
}
