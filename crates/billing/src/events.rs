//! Typed Stripe webhook events
//!
//! Only the fields the reconciler reads are modelled; everything else in the
//! payload is ignored. Event types we do not handle parse to
//! [`WebhookEvent::Unhandled`] so new Stripe events never break delivery.

use std::collections::HashMap;

use outreach_shared::SubscriptionStatus;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::BillingResult;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CUSTOMER_SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const CUSTOMER_SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

/// Metadata key checked when a checkout session has no `client_reference_id`
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// A reference to another Stripe object: either its id or the expanded object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Id(String),
    Object { id: String },
}

impl ObjectRef {
    pub fn id(&self) -> &str {
        match self {
            ObjectRef::Id(id) => id,
            ObjectRef::Object { id } => id,
        }
    }
}

/// Stripe subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeSubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    #[serde(other)]
    Unknown,
}

impl StripeSubscriptionStatus {
    /// Map onto the local status vocabulary
    pub fn to_local(self) -> SubscriptionStatus {
        match self {
            StripeSubscriptionStatus::Active | StripeSubscriptionStatus::Trialing => {
                SubscriptionStatus::Active
            }
            StripeSubscriptionStatus::PastDue => SubscriptionStatus::PastDue,
            StripeSubscriptionStatus::Canceled | StripeSubscriptionStatus::Unpaid => {
                SubscriptionStatus::Canceled
            }
            _ => SubscriptionStatus::Free,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    #[serde(default)]
    pub subscription: Option<ObjectRef>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl CheckoutSession {
    /// The local user this checkout belongs to, as supplied when the session was created
    pub fn correlation_id(&self) -> Option<&str> {
        self.client_reference_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.metadata
                    .as_ref()
                    .and_then(|m| m.get(USER_ID_METADATA_KEY))
                    .map(String::as_str)
                    .filter(|id| !id.is_empty())
            })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recurring {
    pub interval: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<Price>,
    /// Newer API versions report the period on each item
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// Subscription object, as embedded in events or fetched from the API
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub customer: ObjectRef,
    pub status: StripeSubscriptionStatus,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub trial_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl StripeSubscription {
    pub fn is_trialing(&self) -> bool {
        self.status == StripeSubscriptionStatus::Trialing
    }

    /// Period end from the subscription, falling back to its first item
    pub fn period_end(&self) -> Option<OffsetDateTime> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
            .and_then(from_unix)
    }

    pub fn trial_end(&self) -> Option<OffsetDateTime> {
        self.trial_end.and_then(from_unix)
    }

    /// Recurring interval of the first priced item (`month`, `year`, ...)
    pub fn billing_interval(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .and_then(|price| price.recurring.as_ref())
            .map(|recurring| recurring.interval.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub customer: Option<ObjectRef>,
}

/// Events the reconciler acts on
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutSession),
    SubscriptionUpdated(StripeSubscription),
    SubscriptionDeleted(StripeSubscription),
    PaymentFailed(Invoice),
    Unhandled,
}

/// A parsed delivery: envelope identifiers plus the typed event
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub id: String,
    pub event_type: String,
    pub event: WebhookEvent,
}

#[derive(Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: serde_json::Value,
}

impl ParsedEvent {
    pub fn from_slice(payload: &[u8]) -> BillingResult<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)?;
        let object = envelope.data.object;

        let event = match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                WebhookEvent::CheckoutCompleted(serde_json::from_value(object)?)
            }
            CUSTOMER_SUBSCRIPTION_UPDATED => {
                WebhookEvent::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            CUSTOMER_SUBSCRIPTION_DELETED => {
                WebhookEvent::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            INVOICE_PAYMENT_FAILED => WebhookEvent::PaymentFailed(serde_json::from_value(object)?),
            _ => WebhookEvent::Unhandled,
        };

        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            event,
        })
    }
}

pub(crate) fn from_unix(secs: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ParsedEvent {
        ParsedEvent::from_slice(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        use StripeSubscriptionStatus::*;
        assert_eq!(Active.to_local(), SubscriptionStatus::Active);
        assert_eq!(Trialing.to_local(), SubscriptionStatus::Active);
        assert_eq!(PastDue.to_local(), SubscriptionStatus::PastDue);
        assert_eq!(Canceled.to_local(), SubscriptionStatus::Canceled);
        assert_eq!(Unpaid.to_local(), SubscriptionStatus::Canceled);
        assert_eq!(Incomplete.to_local(), SubscriptionStatus::Free);
        assert_eq!(IncompleteExpired.to_local(), SubscriptionStatus::Free);
        assert_eq!(Paused.to_local(), SubscriptionStatus::Free);
        assert_eq!(Unknown.to_local(), SubscriptionStatus::Free);
    }

    #[test]
    fn test_unrecognised_status_parses_as_unknown() {
        let status: StripeSubscriptionStatus = serde_json::from_str("\"suspended\"").unwrap();
        assert_eq!(status, StripeSubscriptionStatus::Unknown);
    }

    #[test]
    fn test_checkout_session_parsed() {
        let parsed = parse(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "client_reference_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
                "customer": "cus_1",
                "subscription": { "id": "sub_1", "object": "subscription" },
                "metadata": null
            }}
        }));

        assert_eq!(parsed.id, "evt_1");
        let WebhookEvent::CheckoutCompleted(session) = parsed.event else {
            panic!("expected checkout event");
        };
        assert_eq!(
            session.correlation_id(),
            Some("7c9e6679-7425-40de-944b-e07fc1f90ae7")
        );
        assert_eq!(session.customer.as_ref().map(ObjectRef::id), Some("cus_1"));
        assert_eq!(session.subscription.as_ref().map(ObjectRef::id), Some("sub_1"));
    }

    #[test]
    fn test_correlation_id_falls_back_to_metadata() {
        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_1",
            "client_reference_id": "",
            "metadata": { "user_id": "abc" }
        }))
        .unwrap();
        assert_eq!(session.correlation_id(), Some("abc"));

        let session: CheckoutSession = serde_json::from_value(json!({ "id": "cs_2" })).unwrap();
        assert_eq!(session.correlation_id(), None);
    }

    #[test]
    fn test_subscription_fields() {
        let sub: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "trialing",
            "trial_end": 1_700_000_000,
            "items": { "data": [
                { "current_period_end": 1_702_592_000, "price": { "recurring": { "interval": "year" } } }
            ]}
        }))
        .unwrap();

        assert!(sub.is_trialing());
        assert_eq!(sub.billing_interval(), Some("year"));
        assert_eq!(sub.period_end().map(|t| t.unix_timestamp()), Some(1_702_592_000));
        assert_eq!(sub.trial_end().map(|t| t.unix_timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_top_level_period_end_preferred() {
        let sub: StripeSubscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": { "id": "cus_1" },
            "status": "active",
            "current_period_end": 100,
            "items": { "data": [ { "current_period_end": 200 } ] }
        }))
        .unwrap();
        assert_eq!(sub.customer.id(), "cus_1");
        assert_eq!(sub.period_end().map(|t| t.unix_timestamp()), Some(100));
        assert_eq!(sub.billing_interval(), None);
    }

    #[test]
    fn test_unknown_event_type_is_unhandled() {
        let parsed = parse(json!({
            "id": "evt_2",
            "type": "customer.tax_id.created",
            "data": { "object": { "anything": [1, 2, 3] } }
        }));
        assert!(matches!(parsed.event, WebhookEvent::Unhandled));
        assert_eq!(parsed.event_type, "customer.tax_id.created");
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(ParsedEvent::from_slice(b"not json").is_err());
        assert!(ParsedEvent::from_slice(br#"{"type":"invoice.payment_failed"}"#).is_err());
        // Known type with the wrong object shape
        let body = br#"{"id":"evt","type":"customer.subscription.deleted","data":{"object":{"id":"sub"}}}"#;
        assert!(ParsedEvent::from_slice(body).is_err());
    }
}
