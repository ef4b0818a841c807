//! Profile store
//!
//! The reconciler owns writes to the billing columns of `profiles`. The store
//! is otherwise opaque: a lookup by Stripe customer id and a partial update.

mod postgres;
mod supabase;

#[cfg(any(test, feature = "test-utils"))]
mod memory;

pub use postgres::PgProfileStore;
pub use supabase::{SupabaseConfig, SupabaseProfileStore};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryProfileStore;

use async_trait::async_trait;
use outreach_shared::{Plan, ProfileSubscription, SubscriptionStatus};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Partial update of a profile's billing columns. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<Plan>,
    pub stripe_customer_id: Option<String>,
    /// `Some(None)` clears the column
    pub current_period_end: Option<Option<OffsetDateTime>>,
    /// Never cleared; only a known trial end is written
    pub trial_ends_at: Option<OffsetDateTime>,
}

impl SubscriptionUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply to an in-memory row
    pub fn apply_to(&self, profile: &mut ProfileSubscription) {
        if let Some(status) = self.status {
            profile.status = status;
        }
        if let Some(plan) = self.plan {
            profile.plan = plan;
        }
        if let Some(customer_id) = &self.stripe_customer_id {
            profile.stripe_customer_id = Some(customer_id.clone());
        }
        if let Some(period_end) = self.current_period_end {
            profile.current_period_end = period_end;
        }
        if let Some(trial_ends_at) = self.trial_ends_at {
            profile.trial_ends_at = Some(trial_ends_at);
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profile linked to a Stripe customer, if any
    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProfileSubscription>>;

    /// Write the set fields of `update`. Errors with `ProfileNotFound` if no row matched.
    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> BillingResult<()>;
}
