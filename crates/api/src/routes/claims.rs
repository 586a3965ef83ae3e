//! Checkout-claim endpoints.
//!
//! After a checkout completes, the buyer signs in and claims the tenant the
//! webhook provisioned. Claims are single-use; a second attempt for the same
//! checkout returns 409.

use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimStripeRequest {
    pub session_id: String,
}

/// POST /api/v1/claim-stripe-tenant
pub async fn claim_stripe_tenant(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    AppJson(req): AppJson<ClaimStripeRequest>,
) -> ApiResult<Json<Value>> {
    let session_id = req.session_id.trim();
    if session_id.is_empty() {
        return Err(ApiError::InputInvalid("session_id is required".into()));
    }

    let tenant_id = state.claims.claim_stripe(user.user_id, session_id).await?;
    tracing::info!(user_id = %user.user_id, %tenant_id, "Stripe checkout claimed");

    Ok(Json(json!({ "tenant_id": tenant_id })))
}

/// POST /api/v1/claim-paypal-tenant
///
/// PayPal captures carry no user id, so the claim is matched on the payer
/// email recorded from the webhook.
pub async fn claim_paypal_tenant(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Value>> {
    let email = user.email.as_deref().filter(|e| !e.is_empty()).ok_or_else(|| {
        ApiError::InputInvalid("authenticated account has no email address".into())
    })?;

    let tenant_id = state.claims.claim_paypal(user.user_id, email).await?;
    tracing::info!(user_id = %user.user_id, %tenant_id, "PayPal checkout claimed");

    Ok(Json(json!({ "tenant_id": tenant_id })))
}
