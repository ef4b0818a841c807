//! Stripe webhook route
//!
//! Only signature failures are reported back to Stripe. Every other outcome,
//! including internal failures, is acknowledged with 200 so Stripe does not
//! start a retry cycle; the outcome is logged instead.

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use outreach_billing::Verification;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const STRIPE_WEBHOOK_PATH: &str = "/stripe-webhook";
pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    // A POST is answered 401 or 200, never 413
    Router::new().route(
        STRIPE_WEBHOOK_PATH,
        post(stripe_webhook)
            .fallback(method_not_allowed)
            .layer(DefaultBodyLimit::disable()),
    )
}

fn acknowledged() -> Json<Value> {
    Json(json!({ "received": true }))
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// POST /stripe-webhook
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.webhooks.verify(&body, signature) {
        Ok(Verification::Verified) => {}
        Ok(Verification::Unconfigured) => {
            tracing::warn!(
                payload_len = body.len(),
                "Stripe webhook acknowledged without processing (no signing secret configured)"
            );
            return Ok(acknowledged());
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                signature_present = signature.is_some(),
                "Rejected Stripe webhook"
            );
            return Err(ApiError::InvalidSignature);
        }
    }

    let report = state.webhooks.handle(&body).await;
    report.log();

    Ok(acknowledged())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use outreach_billing::{
        signature_header, MemoryProfileStore, StripeClient, StripeConfig, WebhookHandler,
    };
    use outreach_shared::{Plan, ProfileSubscription, SubscriptionStatus};
    use serde_json::json;
    use time::OffsetDateTime;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::{Config, StoreConfig};
    use crate::routes::create_router;

    const SECRET: &str = "whsec_route_tests";

    fn test_config(webhook_secret: Option<&str>) -> Config {
        Config {
            bind_address: "127.0.0.1:0".to_string(),
            store: StoreConfig::Postgres {
                database_url: "postgres://unused".to_string(),
            },
            stripe_secret_key: "sk_test_routes".to_string(),
            stripe_api_base: "http://127.0.0.1:9".to_string(),
            stripe_webhook_secret: webhook_secret.map(str::to_string),
            webhook_tolerance_secs: 300,
        }
    }

    fn app(store: &MemoryProfileStore, webhook_secret: Option<&str>) -> Router {
        let config = test_config(webhook_secret);
        let stripe = StripeClient::new(
            StripeConfig::new(config.stripe_secret_key.clone())
                .with_api_base(config.stripe_api_base.clone()),
        )
        .unwrap();
        let handler = WebhookHandler::new(config.webhook_config(), stripe, Arc::new(store.clone()));
        create_router(AppState::new(config, handler))
    }

    fn signed_request(body: &[u8], timestamp: i64) -> Request<Body> {
        let header = signature_header(SECRET, timestamp, body).unwrap();
        Request::builder()
            .method("POST")
            .uri(STRIPE_WEBHOOK_PATH)
            .header("content-type", "application/json")
            .header(STRIPE_SIGNATURE_HEADER, header)
            .body(Body::from(body.to_vec()))
            .unwrap()
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    fn event(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_route",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn profile_for(store: &MemoryProfileStore, customer_id: &str) -> ProfileSubscription {
        let mut profile = ProfileSubscription::new_free(Uuid::new_v4());
        profile.stripe_customer_id = Some(customer_id.to_string());
        profile.status = SubscriptionStatus::Active;
        profile.plan = Plan::ProMonthly;
        store.insert(profile.clone());
        profile
    }

    #[tokio::test]
    async fn test_non_post_methods_rejected() {
        let store = MemoryProfileStore::new();
        for method in ["GET", "PUT", "DELETE", "PATCH", "OPTIONS"] {
            let request = Request::builder()
                .method(method)
                .uri(STRIPE_WEBHOOK_PATH)
                .body(Body::empty())
                .unwrap();
            let response = app(&store, Some(SECRET)).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
            assert_eq!(
                json_body(response).await,
                json!({ "error": "Method not allowed" })
            );
        }
    }

    #[tokio::test]
    async fn test_non_post_rejected_even_with_valid_signature() {
        let store = MemoryProfileStore::new();
        profile_for(&store, "cus_1");
        let body = event("invoice.payment_failed", json!({ "id": "in_1", "customer": "cus_1" }));

        let mut request = signed_request(&body, now());
        *request.method_mut() = axum::http::Method::PUT;
        let response = app(&store, Some(SECRET)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized() {
        let store = MemoryProfileStore::new();
        let request = Request::builder()
            .method("POST")
            .uri(STRIPE_WEBHOOK_PATH)
            .body(Body::from("{}"))
            .unwrap();
        let response = app(&store, Some(SECRET)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Invalid signature" })
        );
    }

    #[tokio::test]
    async fn test_stale_signature_is_unauthorized() {
        let store = MemoryProfileStore::new();
        profile_for(&store, "cus_1");
        let body = event("invoice.payment_failed", json!({ "id": "in_1", "customer": "cus_1" }));

        let response = app(&store, Some(SECRET))
            .oneshot(signed_request(&body, now() - 3600))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_delivery_applied_and_acknowledged() {
        let store = MemoryProfileStore::new();
        let profile = profile_for(&store, "cus_1");
        let body = event("invoice.payment_failed", json!({ "id": "in_1", "customer": "cus_1" }));

        let response = app(&store, Some(SECRET))
            .oneshot(signed_request(&body, now()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "received": true }));
        assert_eq!(
            store.get(profile.user_id).unwrap().status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn test_checkout_without_correlation_id_acknowledged() {
        let store = MemoryProfileStore::new();
        let body = event(
            "checkout.session.completed",
            json!({ "id": "cs_1", "customer": "cus_1" }),
        );

        let response = app(&store, Some(SECRET))
            .oneshot(signed_request(&body, now()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.write_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_customer_acknowledged() {
        let store = MemoryProfileStore::new();
        let body = event(
            "customer.subscription.deleted",
            json!({ "id": "sub_1", "customer": "cus_nobody", "status": "canceled" }),
        );

        let response = app(&store, Some(SECRET))
            .oneshot(signed_request(&body, now()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_internal_failures_still_acknowledged() {
        let store = MemoryProfileStore::new();
        profile_for(&store, "cus_1");
        store.fail_updates(true);

        for body in [
            b"{ not json".to_vec(),
            event("invoice.payment_failed", json!({ "id": "in_1", "customer": "cus_1" })),
        ] {
            let response = app(&store, Some(SECRET))
                .oneshot(signed_request(&body, now()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await, json!({ "received": true }));
        }
    }

    #[tokio::test]
    async fn test_oversized_body_reaches_verification() {
        let store = MemoryProfileStore::new();
        let profile = profile_for(&store, "cus_1");
        let body = event(
            "invoice.payment_failed",
            json!({
                "id": "in_1",
                "customer": "cus_1",
                "metadata": { "padding": "x".repeat(3 * 1024 * 1024) }
            }),
        );
        assert!(body.len() > 2 * 1024 * 1024);

        let unsigned = Request::builder()
            .method("POST")
            .uri(STRIPE_WEBHOOK_PATH)
            .body(Body::from(body.clone()))
            .unwrap();
        let response = app(&store, Some(SECRET)).oneshot(unsigned).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(store.write_count(), 0);

        let response = app(&store, Some(SECRET))
            .oneshot(signed_request(&body, now()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            store.get(profile.user_id).unwrap().status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn test_unset_secret_acknowledges_without_processing() {
        let store = MemoryProfileStore::new();
        let profile = profile_for(&store, "cus_1");
        let body = event("invoice.payment_failed", json!({ "id": "in_1", "customer": "cus_1" }));
        let request = Request::builder()
            .method("POST")
            .uri(STRIPE_WEBHOOK_PATH)
            .body(Body::from(body))
            .unwrap();

        let response = app(&store, None).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "received": true }));
        assert_eq!(store.get(profile.user_id), Some(profile));
    }

    #[tokio::test]
    async fn test_health() {
        let store = MemoryProfileStore::new();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app(&store, Some(SECRET)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }
}
