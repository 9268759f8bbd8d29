//! Server Configuration
//!
//! Loaded from environment variables (after `.env`). Every setting has a
//! default so the server starts with zero configuration for local
//! development. Empty values count as unset.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} is not a valid {expected}: {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `BIND_ADDR`, else `0.0.0.0:$PORT`, else `0.0.0.0:8000`
    pub bind_addr: SocketAddr,

    /// SQLite path or `:memory:`. Env: `DATABASE_URL`. Unset uses the
    /// in-process memory store.
    pub database_url: Option<String>,

    /// Env: `DATABASE_NAME`
    pub database_name: String,

    /// Env: `STRIPE_SECRET_KEY`
    pub stripe_secret_key: Option<String>,

    /// Env: `STRIPE_WEBHOOK_SECRET`
    pub stripe_webhook_secret: Option<String>,

    /// Env: `ADMIN_KEY`. Unset locks the admin listing.
    pub admin_key: Option<String>,

    /// Env: `FRONTEND_URL`. Used for checkout redirects and as the CORS
    /// origin when set.
    pub frontend_url: Option<String>,

    /// Env: `HCAPTCHA_SECRET`. Unset disables human verification.
    pub hcaptcha_secret: Option<String>,

    /// Env: `PAYMENT_CURRENCY`
    pub currency: String,

    /// Env: `RATE_LIMIT_PER_MINUTE`
    pub rate_limit_per_minute: u32,

    /// Env: `CREATE_RATE_LIMIT_PER_MINUTE`
    pub create_rate_limit_per_minute: u32,

    /// Env: `OUTBOUND_TIMEOUT_SECS`
    pub outbound_timeout: Duration,
}

pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8000).into(),
            database_url: None,
            database_name: "eternal_flame".into(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            admin_key: None,
            frontend_url: None,
            hcaptcha_secret: None,
            currency: "usd".into(),
            rate_limit_per_minute: 20,
            create_rate_limit_per_minute: 5,
            outbound_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let bind_addr = match (get("BIND_ADDR"), get("PORT")) {
            (Some(addr), _) => parse("BIND_ADDR", "socket address", addr)?,
            (None, Some(port)) => {
                let port: u16 = parse("PORT", "port", port)?;
                ([0, 0, 0, 0], port).into()
            }
            (None, None) => defaults.bind_addr,
        };

        let outbound_timeout = match get("OUTBOUND_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(parse("OUTBOUND_TIMEOUT_SECS", "number of seconds", secs)?),
            None => defaults.outbound_timeout,
        };

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            database_name: get("DATABASE_NAME").unwrap_or(defaults.database_name),
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            admin_key: get("ADMIN_KEY"),
            frontend_url: get("FRONTEND_URL").map(|url| url.trim_end_matches('/').to_string()),
            hcaptcha_secret: get("HCAPTCHA_SECRET"),
            currency: get("PAYMENT_CURRENCY")
                .map_or(defaults.currency, |c| c.to_ascii_lowercase()),
            rate_limit_per_minute: get("RATE_LIMIT_PER_MINUTE")
                .map(|v| parse::<NonZeroU32>("RATE_LIMIT_PER_MINUTE", "positive integer", v))
                .transpose()?
                .map(NonZeroU32::get)
                .unwrap_or(defaults.rate_limit_per_minute),
            create_rate_limit_per_minute: get("CREATE_RATE_LIMIT_PER_MINUTE")
                .map(|v| parse::<NonZeroU32>("CREATE_RATE_LIMIT_PER_MINUTE", "positive integer", v))
                .transpose()?
                .map(NonZeroU32::get)
                .unwrap_or(defaults.create_rate_limit_per_minute),
            outbound_timeout,
        })
    }

    /// Base URL for checkout redirects
    pub fn frontend_base(&self) -> &str {
        self.frontend_url.as_deref().unwrap_or(DEFAULT_FRONTEND_URL)
    }
}

fn parse<T: std::str::FromStr>(
    key: &'static str,
    expected: &'static str,
    value: String,
) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { key, expected, value })
}
