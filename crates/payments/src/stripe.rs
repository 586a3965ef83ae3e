//! Stripe REST client and webhook signature verification
//!
//! Payment intents are created straight against the Stripe API with the
//! secret key as a bearer credential. Webhook payloads are verified manually
//! against the `stripe-signature` header rather than through an SDK, so the
//! verification keeps working as Stripe rolls API versions forward.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::error::{PaymentError, PaymentResult};

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Accepted clock skew between the signature timestamp and our clock
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe credentials for one resolved scope (tenant or platform)
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// Newly created payment intent
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

/// Verified webhook event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Checkout session object carried in `checkout.session.completed` events
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

impl StripeCheckoutSession {
    /// Email entered at checkout, whichever field Stripe populated
    pub fn email(&self) -> Option<&str> {
        self.customer_email.as_deref().or_else(|| {
            self.customer_details
                .as_ref()
                .and_then(|details| details.email.as_deref())
        })
    }
}

/// Stripe API client
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: STRIPE_API_BASE.to_string(),
            config,
        }
    }

    #[cfg(test)]
    fn with_base_url(config: StripeConfig, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            config,
        }
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Create a payment intent with automatic payment methods enabled
    pub async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt_email: Option<&str>,
        metadata: &[(&str, &str)],
    ) -> PaymentResult<PaymentIntent> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        if let Some(email) = receipt_email {
            form.push(("receipt_email".to_string(), email.to_string()));
        }
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), (*value).to_string()));
        }

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::upstream("stripe", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %body,
                "Stripe payment intent creation failed"
            );
            return Err(PaymentError::upstream(
                "stripe",
                format!("payment intent creation returned {status}"),
            ));
        }

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("stripe", e.to_string()))?;

        tracing::info!(
            payment_intent_id = %intent.id,
            amount_minor = amount_minor,
            "Created Stripe payment intent"
        );
        Ok(intent)
    }

    /// Verify a raw webhook payload and parse the event envelope
    pub fn verify_event(
        &self,
        payload: &str,
        signature_header: &str,
    ) -> PaymentResult<StripeEvent> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        verify_signature(payload, signature_header, &self.config.webhook_secret, now)?;

        let event: StripeEvent = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Verified webhook payload failed to parse");
            PaymentError::SignatureInvalid
        })?;

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Verified Stripe webhook event"
        );
        Ok(event)
    }
}

/// Verify a `stripe-signature` header against the raw payload.
///
/// The header carries `t=<unix seconds>,v1=<hex hmac>` pairs. The signed
/// payload is `{t}.{body}` keyed with the webhook secret, matching what
/// Stripe's own SDKs compute. Timestamps outside the tolerance window are
/// rejected to limit replay.
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
) -> PaymentResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut v1_signature: Option<&str> = None;

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => v1_signature = Some(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::SignatureInvalid)?;
    let v1_signature = v1_signature.ok_or(PaymentError::SignatureInvalid)?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        tracing::warn!(
            timestamp = timestamp,
            now = now_unix,
            "Webhook timestamp outside tolerance window"
        );
        return Err(PaymentError::SignatureInvalid);
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| PaymentError::SignatureInvalid)?;
    mac.update(signed_payload.as_bytes());
    let computed = mac.finalize().into_bytes();

    let received = hex::decode(v1_signature).map_err(|_| PaymentError::SignatureInvalid)?;
    if bool::from(computed.as_slice().ct_eq(received.as_slice())) {
        Ok(())
    } else {
        tracing::warn!("Webhook signature mismatch");
        Err(PaymentError::SignatureInvalid)
    }
}
