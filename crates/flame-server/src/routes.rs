//! Router
//!
//! ```text
//! GET  /health                  liveness (not rate limited)
//! POST /webhook/stripe          signed provider events (not rate limited)
//! GET  /test                    store diagnostics
//! POST /flames                  create (stricter limit)
//! POST /checkout                hosted checkout session
//! GET  /flames/{slug}           public flame
//! POST /flames/{flame_id}/reply reply to a premium flame
//! GET  /gallery                 public + paid flames
//! GET  /admin/flames            paid flames, x-admin-key
//! ```

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    admin_flames, create_checkout, create_flame, diagnostics, gallery, get_flame, health_check,
    reply_to_flame, stripe_webhook,
};
use crate::rate_limit::{RateLimiter, rate_limit_middleware};
use crate::state::AppState;

/// Rate limiters shared between the router and the purge task
#[derive(Clone)]
pub struct Limiters {
    /// Every API route
    pub global: RateLimiter,

    /// Flame creation only, on top of `global`
    pub create: RateLimiter,
}

impl Limiters {
    pub fn per_minute(global: u32, create: u32) -> Self {
        Self {
            global: RateLimiter::per_minute(global),
            create: RateLimiter::per_minute(create),
        }
    }
}

pub fn build_router(state: AppState, limiters: &Limiters, cors_origin: Option<&str>) -> Router {
    // The single path parameter is the slug on GET and the flame id on reply
    let api = Router::new()
        .route("/test", get(diagnostics))
        .route(
            "/flames",
            post(create_flame).route_layer(middleware::from_fn_with_state(
                limiters.create.clone(),
                rate_limit_middleware,
            )),
        )
        .route("/flames/{flame}", get(get_flame))
        .route("/flames/{flame}/reply", post(reply_to_flame))
        .route("/checkout", post(create_checkout))
        .route("/gallery", get(gallery))
        .route("/admin/flames", get(admin_flames))
        .layer(middleware::from_fn_with_state(
            limiters.global.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/stripe", post(stripe_webhook))
        .merge(api)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(_)) => {
            tracing::warn!("FRONTEND_URL is not a valid origin, allowing any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
