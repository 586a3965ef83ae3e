//! Inbound webhook endpoints.
//!
//! Both handlers acknowledge with 200 once the event is recorded; retries of
//! an already-processed event are absorbed by the `webhook_events` ledger.

use axum::{extract::State, http::HeaderMap, Json};
use bizos_payments::{
    credentials, paypal::PayPalWebhookEvent, StripeClient, StripeConfig,
};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult, AppJson},
    state::AppState,
};

/// POST /api/v1/stripe-webhook
///
/// Takes the raw body because signature verification runs over the exact
/// bytes Stripe signed.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InputInvalid("missing stripe-signature header".into()))?;

    // Platform webhook endpoint: always the platform's own secret.
    let creds = state
        .credentials
        .resolve(
            None,
            &[
                credentials::STRIPE_SECRET_KEY,
                credentials::STRIPE_WEBHOOK_SECRET,
            ],
        )
        .await?;
    let secret_key = creds
        .get(credentials::STRIPE_SECRET_KEY)
        .cloned()
        .unwrap_or_default();
    let webhook_secret = creds
        .get(credentials::STRIPE_WEBHOOK_SECRET)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| {
            ApiError::NotConfigured("STRIPE_WEBHOOK_SECRET is not configured".into())
        })?;

    let client = StripeClient::new(StripeConfig {
        secret_key,
        webhook_secret,
    });
    let event = client.verify_event(&body, signature)?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Stripe webhook received");
    let tenant_id = state.webhooks.process_stripe_event(&event).await?;

    Ok(Json(json!({ "received": true, "tenant_id": tenant_id })))
}

/// POST /api/v1/paypal-webhook
pub async fn paypal_webhook(
    State(state): State<AppState>,
    AppJson(event): AppJson<PayPalWebhookEvent>,
) -> ApiResult<Json<Value>> {
    tracing::info!(
        event_id = event.id.as_deref().unwrap_or("<none>"),
        event_type = %event.event_type,
        "PayPal webhook received"
    );
    let tenant_id = state.webhooks.process_paypal_event(&event).await?;

    Ok(Json(json!({ "received": true, "tenant_id": tenant_id })))
}
