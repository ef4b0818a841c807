//! Billing error types

use thiserror::Error;
use uuid::Uuid;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Webhook signature invalid: {0}")]
    WebhookSignatureInvalid(&'static str),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Profile not found: {0}")]
    ProfileNotFound(Uuid),

    #[error("Stripe API error: {0}")]
    Stripe(String),

    #[error("Profile store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::InvalidPayload(err.to_string())
    }
}
