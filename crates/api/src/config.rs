//! Server configuration
//!
//! Read once at startup and passed down explicitly; nothing else reads the
//! process environment.

use std::fmt;

use outreach_billing::client::DEFAULT_API_BASE;
use outreach_billing::{SupabaseConfig, WebhookConfig, DEFAULT_TOLERANCE_SECS};
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where subscription state lives
#[derive(Clone)]
pub enum StoreConfig {
    /// Supabase REST with the service-role key
    Supabase(SupabaseConfig),
    /// Direct Postgres connection
    Postgres { database_url: String },
}

#[derive(Clone)]
pub struct Config {
    pub bind_address: String,
    pub store: StoreConfig,
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    /// `None` puts the webhook in degraded mode (acknowledge, don't process)
    pub stripe_webhook_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let store = match get("DATABASE_URL") {
            Some(database_url) => StoreConfig::Postgres { database_url },
            None => StoreConfig::Supabase(SupabaseConfig {
                url: require("SUPABASE_URL")?,
                service_role_key: require("SUPABASE_SERVICE_ROLE_KEY")?,
            }),
        };

        let webhook_tolerance_secs = match get("WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key: "WEBHOOK_TOLERANCE_SECS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_TOLERANCE_SECS,
        };

        Ok(Self {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            store,
            stripe_secret_key: require("STRIPE_SECRET_KEY")?,
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            webhook_tolerance_secs,
        })
    }

    pub fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig::new(self.stripe_webhook_secret.clone())
            .with_tolerance_secs(self.webhook_tolerance_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = match &self.store {
            StoreConfig::Supabase(supabase) => format!("supabase({})", supabase.url),
            StoreConfig::Postgres { .. } => "postgres".to_string(),
        };
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("store", &store)
            .field("stripe_api_base", &self.stripe_api_base)
            .field("stripe_webhook_secret_set", &self.stripe_webhook_secret.is_some())
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish_non_exhaustive()
    }
}
