//! Subscription domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Local subscription status stored on `profiles.subscription_status`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(SubscriptionStatus::Free),
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

/// Plan stored on `profiles.subscription_plan`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    #[default]
    Basic,
    ProMonthly,
    ProYearly,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::ProMonthly => "pro_monthly",
            Plan::ProYearly => "pro_yearly",
        }
    }

    /// Pro plan for a Stripe recurring interval (`year` → yearly, anything else monthly)
    pub fn from_billing_interval(interval: Option<&str>) -> Self {
        match interval {
            Some("year") => Plan::ProYearly,
            _ => Plan::ProMonthly,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Plan::Basic),
            "pro_monthly" => Ok(Plan::ProMonthly),
            "pro_yearly" => Ok(Plan::ProYearly),
            other => Err(format!("unknown plan: {}", other)),
        }
    }
}

/// Billing columns of a single `profiles` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSubscription {
    pub user_id: Uuid,
    pub status: SubscriptionStatus,
    pub plan: Plan,
    pub stripe_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
}

impl ProfileSubscription {
    /// Row as created at signup
    pub fn new_free(user_id: Uuid) -> Self {
        Self {
            user_id,
            status: SubscriptionStatus::Free,
            plan: Plan::Basic,
            stripe_customer_id: None,
            current_period_end: None,
            trial_ends_at: None,
        }
    }
}
