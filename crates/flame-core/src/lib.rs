//! # flame-core
//!
//! The flame lifecycle: validation, slugs, human verification, checkout
//! and payment reconciliation, and read access.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────┐  POST /flames   ┌──────────────┐  create (unpaid)  ┌───────────────┐
//! │  Client  │────────────────▶│ FlameService │──────────────────▶│ DocumentStore │
//! └──────────┘                 └──────────────┘                   └───────────────┘
//!      │        POST /checkout        │                                   ▲
//!      └─────────────────────────────▶│──▶ PaymentGateway ──▶ redirect    │
//!                                     │                                   │
//! ┌──────────┐  signed webhook        │   verify, then                    │
//! │  Stripe  │───────────────────────▶│   update (paid) ──────────────────┘
//! └──────────┘                        │
//!                                     ▼
//!                              FlameDirectory (slug, gallery, admin)
//! ```
//!
//! ## Payment state
//!
//! `payment_status` starts `unpaid` and only changes when a webhook passes
//! signature verification. Replayed events leave the flame as it is.

pub mod access;
pub mod challenge;
pub mod error;
pub mod model;
pub mod service;
pub mod slug;
pub mod validation;

pub use access::{ADMIN_LIMIT, FlameDirectory, GALLERY_LIMIT, verify_admin_key};
pub use challenge::{ChallengeVerifier, HCaptchaVerifier, StaticChallenge};
pub use error::{FlameError, Result};
pub use model::{FLAME_COLLECTION, Flame, PaymentStatus, REPLY_COLLECTION, Reply};
pub use service::{
    CHALLENGE_TOKEN_FIELD, CheckoutRedirect, CreatedFlame, FlameService, ServiceSettings,
    WebhookOutcome,
};
pub use validation::{FieldViolation, NewFlame, NewReply, ValidationFailure};
