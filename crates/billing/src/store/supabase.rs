//! Profile store over the Supabase REST (PostgREST) interface
//!
//! Uses the service-role key, which bypasses row-level security. The key is
//! sent both as `apikey` and as the bearer token, as PostgREST expects.

use std::time::Duration;

use async_trait::async_trait;
use outreach_shared::{Plan, ProfileSubscription, SubscriptionStatus};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ProfileStore, SubscriptionUpdate};
use crate::error::{BillingError, BillingResult};

const PROFILE_COLUMNS: &str =
    "id,subscription_status,subscription_plan,stripe_customer_id,current_period_end,trial_ends_at";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &"[redacted]")
            .finish()
    }
}

#[derive(Clone)]
pub struct SupabaseProfileStore {
    http: Client,
    config: SupabaseConfig,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: Uuid,
    #[serde(default)]
    subscription_status: Option<SubscriptionStatus>,
    #[serde(default)]
    subscription_plan: Option<Plan>,
    #[serde(default)]
    stripe_customer_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    current_period_end: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    trial_ends_at: Option<OffsetDateTime>,
}

impl From<ProfileRow> for ProfileSubscription {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: row.id,
            status: row.subscription_status.unwrap_or_default(),
            plan: row.subscription_plan.unwrap_or_default(),
            stripe_customer_id: row.stripe_customer_id,
            current_period_end: row.current_period_end,
            trial_ends_at: row.trial_ends_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdatedRow {
    #[allow(dead_code)]
    id: Uuid,
}

impl SupabaseProfileStore {
    pub fn new(config: SupabaseConfig) -> BillingResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn profiles_url(&self) -> String {
        format!("{}/rest/v1/profiles", self.config.url.trim_end_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
    }

    async fn check(response: Response, operation: &str) -> BillingResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BillingError::Store(format!(
            "{} returned {}: {}",
            operation, status, body
        )))
    }

    /// JSON body for a PATCH; only set fields are included
    fn update_body(update: &SubscriptionUpdate) -> BillingResult<Map<String, Value>> {
        let mut body = Map::new();
        if let Some(status) = update.status {
            body.insert("subscription_status".into(), Value::from(status.as_str()));
        }
        if let Some(plan) = update.plan {
            body.insert("subscription_plan".into(), Value::from(plan.as_str()));
        }
        if let Some(customer_id) = &update.stripe_customer_id {
            body.insert("stripe_customer_id".into(), Value::from(customer_id.as_str()));
        }
        if let Some(period_end) = update.current_period_end {
            let value = match period_end {
                Some(ts) => Value::from(format_timestamp(ts)?),
                None => Value::Null,
            };
            body.insert("current_period_end".into(), value);
        }
        if let Some(trial_ends_at) = update.trial_ends_at {
            body.insert(
                "trial_ends_at".into(),
                Value::from(format_timestamp(trial_ends_at)?),
            );
        }
        Ok(body)
    }
}

fn format_timestamp(ts: OffsetDateTime) -> BillingResult<String> {
    ts.format(&Rfc3339)
        .map_err(|e| BillingError::Store(format!("failed to format timestamp: {}", e)))
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProfileSubscription>> {
        let request = self.http.get(self.profiles_url()).query(&[
            ("stripe_customer_id", format!("eq.{}", customer_id).as_str()),
            ("select", PROFILE_COLUMNS),
            ("limit", "1"),
        ]);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| BillingError::Store(format!("profile lookup failed: {}", e)))?;
        let response = Self::check(response, "profile lookup").await?;

        let rows: Vec<ProfileRow> = response
            .json()
            .await
            .map_err(|e| BillingError::Store(format!("invalid profile row: {}", e)))?;

        Ok(rows.into_iter().next().map(ProfileSubscription::from))
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> BillingResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        let body = Self::update_body(update)?;
        let request = self
            .http
            .patch(self.profiles_url())
            .query(&[("id", format!("eq.{}", user_id).as_str()), ("select", "id")])
            .header("Prefer", "return=representation")
            .json(&body);

        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| BillingError::Store(format!("profile update failed: {}", e)))?;
        let response = Self::check(response, "profile update").await?;

        let updated: Vec<UpdatedRow> = response
            .json()
            .await
            .map_err(|e| BillingError::Store(format!("invalid update response: {}", e)))?;

        if updated.is_empty() {
            return Err(BillingError::ProfileNotFound(user_id));
        }

        Ok(())
    }
}
