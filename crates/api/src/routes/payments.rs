//! Payment initiation endpoints for Stripe, PayPal and M-Pesa.
//!
//! Platform purchases (`plan` present) always resolve credentials from the
//! environment and price server-side; tenant-scoped charges resolve the
//! tenant's own keys from `tenant_settings` first.

use axum::{extract::State, Json};
use bizos_payments::{
    credentials, MpesaClient, MpesaConfig, MpesaEnv, PayPalClient, PayPalConfig, PayPalMode,
    StripeClient, StripeConfig,
};
use bizos_shared::types::SubscriptionPlan;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, AppJson},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStripeIntentRequest {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

/// POST /api/v1/create-stripe-payment-intent
pub async fn create_stripe_payment_intent(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateStripeIntentRequest>,
) -> ApiResult<Json<Value>> {
    // Platform plan purchases are priced server-side; the client never
    // supplies the amount for those.
    let (amount_minor, currency, scope, plan_label) = match req.plan.as_deref() {
        Some(plan_str) => {
            let plan: SubscriptionPlan = plan_str
                .parse()
                .map_err(|_| ApiError::InputInvalid(format!("unknown plan: {plan_str}")))?;
            let amount = plan.platform_price_minor_units().ok_or_else(|| {
                ApiError::InputInvalid(format!("plan {plan} is not purchasable"))
            })?;
            (amount, "usd".to_string(), None, Some(plan.to_string()))
        }
        None => {
            let amount = req
                .amount
                .ok_or_else(|| ApiError::InputInvalid("amount is required".into()))?;
            if amount <= 0 {
                return Err(ApiError::InputInvalid("amount must be positive".into()));
            }
            let currency = req
                .currency
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or("usd")
                .to_lowercase();
            (amount, currency, req.tenant_id, None)
        }
    };

    let creds = state
        .credentials
        .resolve(scope, &[credentials::STRIPE_SECRET_KEY])
        .await?;
    let secret_key = required_credential(&creds, credentials::STRIPE_SECRET_KEY)?;

    let client = StripeClient::new(StripeConfig {
        secret_key,
        // Intent creation never touches the webhook secret.
        webhook_secret: String::new(),
    });

    let mut metadata: Vec<(&str, &str)> = Vec::new();
    if let Some(plan) = plan_label.as_deref() {
        metadata.push(("plan_type", plan));
    }
    let tenant_str = req.tenant_id.map(|id| id.to_string());
    if let Some(tenant) = tenant_str.as_deref() {
        metadata.push(("tenant_id", tenant));
    }

    let intent = client
        .create_payment_intent(
            amount_minor,
            &currency,
            req.customer_email.as_deref(),
            &metadata,
        )
        .await?;

    Ok(Json(json!({
        "clientSecret": intent.client_secret,
        "paymentIntentId": intent.id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePayPalOrderRequest {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

/// POST /api/v1/create-paypal-order
pub async fn create_paypal_order(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreatePayPalOrderRequest>,
) -> ApiResult<Json<Value>> {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err(ApiError::InputInvalid("amount must be positive".into()));
    }
    let currency = req
        .currency
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("USD")
        .to_uppercase();

    let client = paypal_client(&state, req.tenant_id).await?;
    let value = format!("{:.2}", req.amount);
    let order_id = client.create_order(&value, &currency).await?;

    Ok(Json(json!({ "orderID": order_id })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapturePayPalOrderRequest {
    #[serde(rename = "orderId", alias = "orderID")]
    pub order_id: String,
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

/// POST /api/v1/capture-paypal-order
pub async fn capture_paypal_order(
    State(state): State<AppState>,
    AppJson(req): AppJson<CapturePayPalOrderRequest>,
) -> ApiResult<Json<Value>> {
    if req.order_id.trim().is_empty() {
        return Err(ApiError::InputInvalid("orderId is required".into()));
    }

    let client = paypal_client(&state, req.tenant_id).await?;
    let outcome = client.capture_order(req.order_id.trim()).await?;

    Ok(Json(json!({
        "success": outcome.completed(),
        "orderID": req.order_id.trim(),
        "details": outcome.details,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpesaStkPushRequest {
    pub tenant_id: Uuid,
    pub phone: String,
    pub amount: u64,
}

/// POST /api/v1/mpesa-stk-push
pub async fn mpesa_stk_push(
    State(state): State<AppState>,
    AppJson(req): AppJson<MpesaStkPushRequest>,
) -> ApiResult<Json<Value>> {
    if req.amount == 0 {
        return Err(ApiError::InputInvalid("amount must be positive".into()));
    }

    let client = mpesa_client(&state, req.tenant_id).await?;
    let reference = short_reference(req.tenant_id);
    let response = client
        .stk_push(&req.phone, req.amount, &reference, "Booking payment")
        .await?;

    Ok(Json(json!({
        "success": true,
        "checkoutRequestID": response.checkout_request_id,
        "merchantRequestID": response.merchant_request_id,
        "customerMessage": response.customer_message,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpesaStkQueryRequest {
    pub tenant_id: Uuid,
    #[serde(rename = "checkoutRequestID", alias = "checkout_request_id")]
    pub checkout_request_id: String,
}

/// POST /api/v1/mpesa-stk-query
pub async fn mpesa_stk_query(
    State(state): State<AppState>,
    AppJson(req): AppJson<MpesaStkQueryRequest>,
) -> ApiResult<Json<Value>> {
    if req.checkout_request_id.trim().is_empty() {
        return Err(ApiError::InputInvalid(
            "checkoutRequestID is required".into(),
        ));
    }

    let client = mpesa_client(&state, req.tenant_id).await?;
    let response = client.stk_query(req.checkout_request_id.trim()).await?;

    Ok(Json(json!({
        "paid": response.paid(),
        "resultCode": response.result_code,
        "resultDesc": response.result_desc,
    })))
}

async fn paypal_client(state: &AppState, tenant_id: Option<Uuid>) -> ApiResult<PayPalClient> {
    let creds = state
        .credentials
        .resolve(
            tenant_id,
            &[
                credentials::PAYPAL_CLIENT_ID,
                credentials::PAYPAL_CLIENT_SECRET,
            ],
        )
        .await?;
    Ok(PayPalClient::new(PayPalConfig {
        client_id: required_credential(&creds, credentials::PAYPAL_CLIENT_ID)?,
        client_secret: required_credential(&creds, credentials::PAYPAL_CLIENT_SECRET)?,
        mode: PayPalMode::from_mode_str(&state.config.paypal_mode),
    }))
}

async fn mpesa_client(state: &AppState, tenant_id: Uuid) -> ApiResult<MpesaClient> {
    let creds = state
        .credentials
        .resolve(
            Some(tenant_id),
            &[
                credentials::MPESA_CONSUMER_KEY,
                credentials::MPESA_CONSUMER_SECRET,
                credentials::MPESA_SHORTCODE,
                credentials::MPESA_PASSKEY,
            ],
        )
        .await?;
    Ok(MpesaClient::new(MpesaConfig {
        consumer_key: required_credential(&creds, credentials::MPESA_CONSUMER_KEY)?,
        consumer_secret: required_credential(&creds, credentials::MPESA_CONSUMER_SECRET)?,
        shortcode: required_credential(&creds, credentials::MPESA_SHORTCODE)?,
        passkey: required_credential(&creds, credentials::MPESA_PASSKEY)?,
        env: MpesaEnv::from_env_str(&state.config.mpesa_env),
        callback_url: state.config.mpesa_callback_url.clone(),
    }))
}

fn required_credential(
    creds: &std::collections::HashMap<String, String>,
    key: &str,
) -> ApiResult<String> {
    creds
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ApiError::NotConfigured(format!("{key} is not configured")))
}

/// Daraja caps AccountReference at 12 characters.
fn short_reference(tenant_id: Uuid) -> String {
    tenant_id.simple().to_string()[..12].to_uppercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn short_reference_fits_daraja_limit() {
        let reference = short_reference(Uuid::new_v4());
        assert_eq!(reference.len(), 12);
        assert!(reference.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn plan_request_without_amount_parses() {
        let req: CreateStripeIntentRequest =
            serde_json::from_str(r#"{"plan": "starter", "customer_email": "a@b.co"}"#)
                .expect("valid request");
        assert_eq!(req.plan.as_deref(), Some("starter"));
        assert!(req.amount.is_none());
    }

    #[test]
    fn capture_request_accepts_both_casings() {
        let a: CapturePayPalOrderRequest =
            serde_json::from_str(r#"{"orderId": "5O190127TN364715T"}"#).expect("camelCase");
        let b: CapturePayPalOrderRequest =
            serde_json::from_str(r#"{"orderID": "5O190127TN364715T"}"#).expect("capitalized");
        assert_eq!(a.order_id, b.order_id);
    }
}
