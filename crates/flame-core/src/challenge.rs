//! Human Verification
//!
//! Flame creation may require a challenge token from the hCaptcha widget.
//! With no secret configured the verifier lets every request through; this
//! is a development mode and the server warns about it at startup.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// hCaptcha verification endpoint
pub const HCAPTCHA_VERIFY_URL: &str = "https://hcaptcha.com/siteverify";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Challenge token verifier (Strategy pattern)
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    /// Whether the token proves a human. Never errors: any failure is `false`.
    async fn verify(&self, token: Option<&str>) -> bool;

    /// Whether tokens are actually checked
    fn is_enforcing(&self) -> bool;
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// hCaptcha `siteverify` client
pub struct HCaptchaVerifier {
    http: reqwest::Client,
    secret: Option<String>,
    verify_url: String,
}

impl HCaptchaVerifier {
    /// Verifier for `secret`; `None` or empty disables verification
    pub fn new(secret: Option<String>) -> Self {
        Self::with_timeout(secret, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(secret: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            secret: secret.filter(|s| !s.is_empty()),
            verify_url: HCAPTCHA_VERIFY_URL.to_string(),
        }
    }

    /// Point at a different `siteverify` endpoint
    #[must_use]
    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }
}

#[async_trait]
impl ChallengeVerifier for HCaptchaVerifier {
    async fn verify(&self, token: Option<&str>) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return false;
        };

        let response = self
            .http
            .post(&self.verify_url)
            .form(&[("secret", secret.as_str()), ("response", token)])
            .send()
            .await;

        let body = match response {
            Ok(resp) => resp.json::<SiteVerifyResponse>().await,
            Err(e) => {
                tracing::warn!(error = %e, "Challenge service unreachable");
                return false;
            }
        };

        match body {
            Ok(result) => {
                if !result.success {
                    tracing::debug!(codes = ?result.error_codes, "Challenge rejected");
                }
                result.success
            }
            Err(e) => {
                tracing::warn!(error = %e, "Challenge service returned an invalid response");
                false
            }
        }
    }

    fn is_enforcing(&self) -> bool {
        self.secret.is_some()
    }
}

/// Verifier with a fixed answer (for tests)
pub struct StaticChallenge(pub bool);

#[async_trait]
impl ChallengeVerifier for StaticChallenge {
    async fn verify(&self, _token: Option<&str>) -> bool {
        self.0
    }

    fn is_enforcing(&self) -> bool {
        !self.0
    }
}
