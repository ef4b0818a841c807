//! Profile store over a direct Postgres connection

use async_trait::async_trait;
use outreach_shared::{Plan, ProfileSubscription, SubscriptionStatus};
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ProfileStore, SubscriptionUpdate};
use crate::error::{BillingError, BillingResult};

#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    subscription_status: String,
    subscription_plan: String,
    stripe_customer_id: Option<String>,
    current_period_end: Option<OffsetDateTime>,
    trial_ends_at: Option<OffsetDateTime>,
}

impl TryFrom<ProfileRow> for ProfileSubscription {
    type Error = BillingError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.id,
            status: row
                .subscription_status
                .parse::<SubscriptionStatus>()
                .map_err(BillingError::Database)?,
            plan: row
                .subscription_plan
                .parse::<Plan>()
                .map_err(BillingError::Database)?,
            stripe_customer_id: row.stripe_customer_id,
            current_period_end: row.current_period_end,
            trial_ends_at: row.trial_ends_at,
        })
    }
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_customer_id(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProfileSubscription>> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_status, subscription_plan, stripe_customer_id,
                   current_period_end, trial_ends_at
            FROM profiles
            WHERE stripe_customer_id = $1
            LIMIT 1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProfileSubscription::try_from).transpose()
    }

    async fn update_subscription(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> BillingResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE profiles SET ");
        {
            let mut set = query.separated(", ");
            if let Some(status) = update.status {
                set.push("subscription_status = ")
                    .push_bind_unseparated(status.as_str());
            }
            if let Some(plan) = update.plan {
                set.push("subscription_plan = ")
                    .push_bind_unseparated(plan.as_str());
            }
            if let Some(customer_id) = &update.stripe_customer_id {
                set.push("stripe_customer_id = ")
                    .push_bind_unseparated(customer_id.clone());
            }
            if let Some(period_end) = update.current_period_end {
                set.push("current_period_end = ")
                    .push_bind_unseparated(period_end);
            }
            if let Some(trial_ends_at) = update.trial_ends_at {
                set.push("trial_ends_at = ")
                    .push_bind_unseparated(trial_ends_at);
            }
        }
        query.push(" WHERE id = ").push_bind(user_id);

        let result = query.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(BillingError::ProfileNotFound(user_id));
        }

        Ok(())
    }
}
