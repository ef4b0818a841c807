// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Outreach Billing Module
//!
//! Reconciles Stripe subscription state into user profiles.
//!
//! ## Features
//!
//! - **Signature verification**: `stripe-signature` HMAC check with a replay window
//! - **Typed events**: checkout completion, subscription updates/deletions, failed payments
//! - **Enrichment**: best-effort subscription fetch for completed checkouts
//! - **Profile stores**: Supabase REST or direct Postgres backends

pub mod client;
pub mod error;
pub mod events;
pub mod signature;
pub mod store;
pub mod webhooks;


// Client
pub use client::{StripeClient, StripeConfig};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{ParsedEvent, StripeSubscription, StripeSubscriptionStatus, WebhookEvent};

// Signature
pub use signature::{signature_header, verify_signature, DEFAULT_TOLERANCE_SECS};

// Store
pub use store::{
    PgProfileStore, ProfileStore, SubscriptionUpdate, SupabaseConfig, SupabaseProfileStore,
};

#[cfg(any(test, feature = "test-utils"))]
pub use store::MemoryProfileStore;

// Webhooks
pub use webhooks::{
    Verification, WebhookConfig, WebhookHandler, WebhookOutcome, WebhookReport,
};
