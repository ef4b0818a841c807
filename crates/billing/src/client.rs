//! Stripe API client
//!
//! Only the read the reconciler needs: fetching a subscription to enrich a
//! completed checkout.

use std::time::Duration;

use reqwest::Client;

use crate::error::{BillingError, BillingResult};
use crate::events::StripeSubscription;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stripe credentials and endpoint
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub api_base: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> BillingResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// GET /v1/subscriptions/{id}
    pub async fn fetch_subscription(&self, subscription_id: &str) -> BillingResult<StripeSubscription> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base.trim_end_matches('/'),
            subscription_id
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| BillingError::Stripe(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Stripe(format!(
                "GET subscription {} returned {}: {}",
                subscription_id, status, body
            )));
        }

        response
            .json::<StripeSubscription>()
            .await
            .map_err(|e| BillingError::Stripe(format!("invalid subscription response: {}", e)))
    }
}
