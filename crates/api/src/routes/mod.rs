//! HTTP routes

mod health;
mod webhooks;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use webhooks::{STRIPE_SIGNATURE_HEADER, STRIPE_WEBHOOK_PATH};

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
