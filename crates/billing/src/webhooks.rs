//! Stripe webhook handling
//!
//! Verifies deliveries and reconciles subscription lifecycle events into the
//! billing columns of `profiles`. Every write is a plain field assignment, so
//! redelivery of the same event converges on the same row.

use std::sync::Arc;

use outreach_shared::{Plan, SubscriptionStatus};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{CheckoutSession, Invoice, ParsedEvent, StripeSubscription, WebhookEvent};
use crate::signature::{verify_signature, DEFAULT_TOLERANCE_SECS};
use crate::store::{ProfileStore, SubscriptionUpdate};

/// Webhook settings, injected at construction
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint signing secret (`whsec_...`). `None` disables verification
    /// and processing: deliveries are acknowledged and dropped.
    pub webhook_secret: Option<String>,
    pub tolerance_secs: u64,
}

impl WebhookConfig {
    pub fn new(webhook_secret: Option<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance_secs(mut self, tolerance_secs: u64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }
}

/// Result of authenticating a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    /// No signing secret configured
    Unconfigured,
}

/// What processing a verified delivery did. All variants are acknowledged with 200.
#[derive(Debug)]
pub enum WebhookOutcome {
    Applied { user_id: Uuid },
    Skipped { reason: &'static str },
    Ignored,
    Failed { error: BillingError },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Skipped { .. } => "skipped",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::Failed { .. } => "failed",
        }
    }
}

/// Processing result together with the envelope identifiers, when the body parsed
#[derive(Debug)]
pub struct WebhookReport {
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub outcome: WebhookOutcome,
}

impl WebhookReport {
    /// Log the report. Caught internal errors go to `error`, policy skips to `info`.
    pub fn log(&self) {
        let event_id = self.event_id.as_deref().unwrap_or("-");
        let event_type = self.event_type.as_deref().unwrap_or("-");
        match &self.outcome {
            WebhookOutcome::Applied { user_id } => tracing::info!(
                event_id,
                event_type,
                user_id = %user_id,
                outcome = self.outcome.label(),
                "Stripe webhook applied"
            ),
            WebhookOutcome::Skipped { reason } => tracing::info!(
                event_id,
                event_type,
                reason,
                outcome = self.outcome.label(),
                "Stripe webhook skipped"
            ),
            WebhookOutcome::Ignored => tracing::debug!(
                event_id,
                event_type,
                outcome = self.outcome.label(),
                "Stripe webhook ignored - no handler for event type"
            ),
            WebhookOutcome::Failed { error } => tracing::error!(
                event_id,
                event_type,
                error = %error,
                outcome = self.outcome.label(),
                "Stripe webhook failed internally, acknowledged anyway"
            ),
        }
    }
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    config: WebhookConfig,
    stripe: StripeClient,
    store: Arc<dyn ProfileStore>,
}

impl WebhookHandler {
    pub fn new(config: WebhookConfig, stripe: StripeClient, store: Arc<dyn ProfileStore>) -> Self {
        if config.webhook_secret.is_none() {
            tracing::warn!(
                "STRIPE_WEBHOOK_SECRET not set - webhook deliveries will be acknowledged without verification or processing"
            );
        }
        Self {
            config,
            stripe,
            store,
        }
    }

    /// Authenticate a delivery against the current clock
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> BillingResult<Verification> {
        self.verify_at(payload, signature, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Authenticate a delivery at `now` (unix seconds)
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> BillingResult<Verification> {
        let Some(secret) = self.config.webhook_secret.as_deref() else {
            return Ok(Verification::Unconfigured);
        };

        let signature =
            signature.ok_or(BillingError::WebhookSignatureInvalid("missing signature header"))?;

        verify_signature(payload, signature, secret, self.config.tolerance_secs, now)?;
        Ok(Verification::Verified)
    }

    /// Parse and apply a verified delivery. Never fails: errors become `WebhookOutcome::Failed`.
    pub async fn handle(&self, payload: &[u8]) -> WebhookReport {
        let parsed = match ParsedEvent::from_slice(payload) {
            Ok(parsed) => parsed,
            Err(error) => {
                return WebhookReport {
                    event_id: None,
                    event_type: None,
                    outcome: WebhookOutcome::Failed { error },
                }
            }
        };

        tracing::debug!(
            event_id = %parsed.id,
            event_type = %parsed.event_type,
            "Processing Stripe webhook event"
        );

        let outcome = match self.process_event(parsed.event).await {
            Ok(outcome) => outcome,
            Err(error) => WebhookOutcome::Failed { error },
        };

        WebhookReport {
            event_id: Some(parsed.id),
            event_type: Some(parsed.event_type),
            outcome,
        }
    }

    async fn process_event(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted(session) => {
                self.handle_checkout_completed(session).await
            }
            WebhookEvent::SubscriptionUpdated(subscription) => {
                self.handle_subscription_updated(subscription).await
            }
            WebhookEvent::SubscriptionDeleted(subscription) => {
                self.handle_subscription_deleted(subscription).await
            }
            WebhookEvent::PaymentFailed(invoice) => self.handle_payment_failed(invoice).await,
            WebhookEvent::Unhandled => Ok(WebhookOutcome::Ignored),
        }
    }

    async fn handle_checkout_completed(
        &self,
        session: CheckoutSession,
    ) -> BillingResult<WebhookOutcome> {
        let Some(correlation_id) = session.correlation_id() else {
            tracing::warn!(
                session_id = %session.id,
                "Checkout completed without a user reference - nothing to update"
            );
            return Ok(WebhookOutcome::Skipped {
                reason: "missing correlation id",
            });
        };

        let Ok(user_id) = Uuid::parse_str(correlation_id) else {
            tracing::warn!(
                session_id = %session.id,
                correlation_id = %correlation_id,
                "Checkout user reference is not a valid user id"
            );
            return Ok(WebhookOutcome::Skipped {
                reason: "invalid correlation id",
            });
        };

        let detail = match &session.subscription {
            Some(subscription) => self.fetch_subscription_detail(subscription.id()).await,
            None => None,
        };

        let plan = Plan::from_billing_interval(detail.as_ref().and_then(|d| d.billing_interval()));
        let trial_ends_at = detail
            .as_ref()
            .filter(|d| d.is_trialing())
            .and_then(|d| d.trial_end());

        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::Active),
            plan: Some(plan),
            stripe_customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
            current_period_end: Some(detail.as_ref().and_then(|d| d.period_end())),
            trial_ends_at,
        };

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            plan = %plan,
            trialing = trial_ends_at.is_some(),
            "Activating subscription after checkout"
        );

        self.apply(user_id, &update).await
    }

    async fn handle_subscription_updated(
        &self,
        subscription: StripeSubscription,
    ) -> BillingResult<WebhookOutcome> {
        let customer_id = subscription.customer.id();
        let Some(profile) = self.store.find_by_customer_id(customer_id).await? else {
            tracing::info!(
                customer_id = %customer_id,
                subscription_id = %subscription.id,
                "No profile for Stripe customer - subscription update skipped"
            );
            return Ok(WebhookOutcome::Skipped {
                reason: "unknown customer",
            });
        };

        // First-write-wins: a recorded trial end is never replaced
        let trial_ends_at = if subscription.is_trialing() && profile.trial_ends_at.is_none() {
            subscription.trial_end()
        } else {
            None
        };

        let status = subscription.status.to_local();
        let update = SubscriptionUpdate {
            status: Some(status),
            current_period_end: Some(subscription.period_end()),
            trial_ends_at,
            ..Default::default()
        };

        tracing::info!(
            user_id = %profile.user_id,
            subscription_id = %subscription.id,
            stripe_status = ?subscription.status,
            status = %status,
            "Subscription updated"
        );

        self.apply(profile.user_id, &update).await
    }

    async fn handle_subscription_deleted(
        &self,
        subscription: StripeSubscription,
    ) -> BillingResult<WebhookOutcome> {
        let customer_id = subscription.customer.id();
        let Some(profile) = self.store.find_by_customer_id(customer_id).await? else {
            tracing::info!(
                customer_id = %customer_id,
                subscription_id = %subscription.id,
                "No profile for Stripe customer - subscription deletion skipped"
            );
            return Ok(WebhookOutcome::Skipped {
                reason: "unknown customer",
            });
        };

        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::Canceled),
            plan: Some(Plan::Basic),
            ..Default::default()
        };

        tracing::info!(
            user_id = %profile.user_id,
            subscription_id = %subscription.id,
            "Subscription cancelled, downgraded to basic plan"
        );

        self.apply(profile.user_id, &update).await
    }

    async fn handle_payment_failed(&self, invoice: Invoice) -> BillingResult<WebhookOutcome> {
        let Some(customer) = invoice.customer.as_ref() else {
            tracing::warn!(invoice_id = ?invoice.id, "Failed invoice has no customer");
            return Ok(WebhookOutcome::Skipped {
                reason: "invoice without customer",
            });
        };

        let Some(profile) = self.store.find_by_customer_id(customer.id()).await? else {
            tracing::info!(
                customer_id = %customer.id(),
                invoice_id = ?invoice.id,
                "No profile for Stripe customer - payment failure skipped"
            );
            return Ok(WebhookOutcome::Skipped {
                reason: "unknown customer",
            });
        };

        let update = SubscriptionUpdate {
            status: Some(SubscriptionStatus::PastDue),
            ..Default::default()
        };

        tracing::warn!(
            user_id = %profile.user_id,
            invoice_id = ?invoice.id,
            "Invoice payment failed, subscription marked past due"
        );

        self.apply(profile.user_id, &update).await
    }

    /// Best-effort subscription lookup; failures leave derived fields at their defaults
    async fn fetch_subscription_detail(&self, subscription_id: &str) -> Option<StripeSubscription> {
        match self.stripe.fetch_subscription(subscription_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                tracing::warn!(
                    subscription_id = %subscription_id,
                    error = %e,
                    "Failed to fetch subscription from Stripe, continuing without it"
                );
                None
            }
        }
    }

    async fn apply(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> BillingResult<WebhookOutcome> {
        match self.store.update_subscription(user_id, update).await {
            Ok(()) => Ok(WebhookOutcome::Applied { user_id }),
            Err(BillingError::ProfileNotFound(_)) => {
                tracing::warn!(user_id = %user_id, "No profile row to update");
                Ok(WebhookOutcome::Skipped {
                    reason: "profile not found",
                })
            }
            Err(e) => Err(e),
        }
    }
}
