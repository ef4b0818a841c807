#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Outreach shared types
//!
//! Subscription types shared by the billing reconciler and the API server,
//! plus Postgres pool helpers.

pub mod db;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{Plan, ProfileSubscription, SubscriptionStatus};
