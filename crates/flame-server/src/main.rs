//! eternal-flame HTTP Server
//!
//! Axum-based REST API for creating flame pages, paying for them through
//! Stripe Checkout and reading them back by slug.

mod config;
mod error;
mod handlers;
mod rate_limit;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flame_core::{
    ChallengeVerifier, FlameDirectory, FlameService, HCaptchaVerifier, ServiceSettings,
};
use flame_payments::{StripeClient, WebhookVerifier};
use flame_store::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};

use crate::config::ServerConfig;
use crate::routes::{Limiters, build_router};
use crate::state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(300);
const BUCKET_MAX_IDLE: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // Document store
    let store = open_store(&config)?;
    match store.ping().await {
        Ok(()) => tracing::info!("✓ Store ready ({})", store.backend()),
        Err(e) => tracing::warn!("⚠ Store not answering: {}", e),
    }

    // Payments
    let mut service = FlameService::new(
        store.clone(),
        challenge_verifier(&config),
        ServiceSettings {
            frontend_url: config.frontend_base().to_string(),
            currency: config.currency.clone(),
        },
    );

    if let Some(key) = &config.stripe_secret_key {
        service = service.with_gateway(Arc::new(
            StripeClient::new(key).with_timeout(config.outbound_timeout),
        ));
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - checkout disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
    }

    if let Some(secret) = &config.stripe_webhook_secret {
        service = service.with_webhook_verifier(WebhookVerifier::new(secret.clone()));
    } else {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - flames can never be marked paid");
    }

    if config.admin_key.is_none() {
        tracing::warn!("⚠ ADMIN_KEY not set - admin listing disabled");
    }

    // Build application state
    let state = AppState {
        service: Arc::new(service),
        directory: Arc::new(FlameDirectory::new(store.clone(), config.admin_key.clone())),
        store: store.clone(),
        database_name: config.database_name.clone(),
    };

    let limiters = Limiters::per_minute(
        config.rate_limit_per_minute,
        config.create_rate_limit_per_minute,
    );
    spawn_bucket_purge(limiters.clone());

    let app = build_router(state, &limiters, config.frontend_url.as_deref());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🔥 eternal-flame server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                - Health check");
    tracing::info!("  GET  /test                  - Store diagnostics");
    tracing::info!("  POST /flames                - Create flame");
    tracing::info!("  GET  /flames/{{slug}}         - Public flame");
    tracing::info!("  POST /flames/{{id}}/reply     - Reply (premium)");
    tracing::info!("  POST /checkout              - Create Stripe checkout");
    tracing::info!("  POST /webhook/stripe        - Stripe webhook");
    tracing::info!("  GET  /gallery               - Public gallery");
    tracing::info!("  GET  /admin/flames          - Paid flames (x-admin-key)");
    tracing::info!("");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutting down, closing store");
    store.close().await?;

    Ok(())
}

fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("⚠ DATABASE_URL not set - using in-memory store, data is lost on restart");
        return Ok(Arc::new(MemoryDocumentStore::new()));
    };

    let path = url.strip_prefix("sqlite://").unwrap_or(url);
    let store = if path == ":memory:" {
        SqliteDocumentStore::open_in_memory(config.database_name.clone())?
    } else {
        SqliteDocumentStore::open(path, config.database_name.clone())?
    };

    Ok(Arc::new(store))
}

fn challenge_verifier(config: &ServerConfig) -> Arc<dyn ChallengeVerifier> {
    let verifier =
        HCaptchaVerifier::with_timeout(config.hcaptcha_secret.clone(), config.outbound_timeout);

    if verifier.is_enforcing() {
        tracing::info!("✓ hCaptcha verification enabled");
    } else {
        tracing::warn!("⚠ HCAPTCHA_SECRET not set - every flame creation passes human verification");
    }

    Arc::new(verifier)
}

fn spawn_bucket_purge(limiters: Limiters) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            limiters.global.purge_stale(BUCKET_MAX_IDLE).await;
            limiters.create.purge_stale(BUCKET_MAX_IDLE).await;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = signal_or_pending("Ctrl-C", tokio::signal::ctrl_c());

    #[cfg(unix)]
    let terminate = signal_or_pending("SIGTERM", async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        signal.recv().await;
        Ok::<(), std::io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Resolve when `listener` fires. A listener that fails never resolves, so
/// shutdown waits on the remaining signals.
async fn signal_or_pending<E: std::fmt::Display>(
    name: &str,
    listener: impl Future<Output = Result<(), E>>,
) {
    if let Err(e) = listener.await {
        tracing::error!("Failed to listen for {}: {}", name, e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_signal_listener_does_not_trigger_shutdown() {
        let failed = signal_or_pending("test", async { Err::<(), _>("unsupported") });
        assert!(
            tokio::time::timeout(Duration::from_millis(50), failed)
                .await
                .is_err()
        );

        let fired = signal_or_pending("test", async { Ok::<(), &str>(()) });
        assert!(
            tokio::time::timeout(Duration::from_millis(50), fired)
                .await
                .is_ok()
        );
    }
}
