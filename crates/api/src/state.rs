//! Application state

use std::sync::Arc;

use outreach_billing::{
    BillingResult, PgProfileStore, ProfileStore, StripeClient, StripeConfig, SupabaseProfileStore,
    WebhookHandler,
};

use crate::config::{Config, StoreConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub webhooks: Arc<WebhookHandler>,
}

impl AppState {
    pub fn new(config: Config, webhooks: WebhookHandler) -> Self {
        Self {
            config: Arc::new(config),
            webhooks: Arc::new(webhooks),
        }
    }

    /// Build the store, Stripe client and webhook handler described by `config`
    pub async fn from_config(config: Config) -> BillingResult<Self> {
        let store: Arc<dyn ProfileStore> = match &config.store {
            StoreConfig::Supabase(supabase) => {
                tracing::info!(url = %supabase.url, "Using Supabase REST profile store");
                Arc::new(SupabaseProfileStore::new(supabase.clone())?)
            }
            StoreConfig::Postgres { database_url } => {
                tracing::info!("Connecting to database...");
                let pool = outreach_shared::create_pool(database_url).await?;
                tracing::info!("Database connection established");
                Arc::new(PgProfileStore::new(pool))
            }
        };

        let stripe = StripeClient::new(
            StripeConfig::new(config.stripe_secret_key.clone())
                .with_api_base(config.stripe_api_base.clone()),
        )?;

        let webhooks = WebhookHandler::new(config.webhook_config(), stripe, store);
        Ok(Self::new(config, webhooks))
    }
}
