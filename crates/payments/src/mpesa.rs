//! M-Pesa Daraja client (STK Push and STK Query)
//!
//! Daraja authenticates with an OAuth2 client-credentials exchange, then
//! signs each STK request with a password derived from the shortcode,
//! passkey, and a `YYYYMMDDHHmmss` timestamp. The query path recomputes the
//! password with a fresh timestamp rather than reusing the push's.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{PaymentError, PaymentResult};

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Which Daraja environment to call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnv {
    Sandbox,
    Production,
}

impl MpesaEnv {
    /// Parse the `MPESA_ENV` setting. Anything other than production/live is
    /// treated as sandbox.
    pub fn from_env_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "live" => Self::Production,
            _ => Self::Sandbox,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.safaricom.co.ke",
            Self::Production => "https://api.safaricom.co.ke",
        }
    }
}

/// Daraja credentials and shortcode material for one resolved scope
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub env: MpesaEnv,
    pub callback_url: String,
}

/// Daraja's acknowledgement of an STK push request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushResponse {
    #[serde(default, rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(default, rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub response_code: String,
    #[serde(default)]
    pub response_description: String,
    #[serde(default)]
    pub customer_message: String,
}

/// Daraja's answer to an STK status query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryResponse {
    #[serde(default, deserialize_with = "string_from_any")]
    pub response_code: String,
    #[serde(default)]
    pub response_description: String,
    #[serde(default, deserialize_with = "string_from_any")]
    pub result_code: String,
    #[serde(default)]
    pub result_desc: String,
    #[serde(default, rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

impl StkQueryResponse {
    /// Result code "0" is the only success signal Daraja documents
    pub fn paid(&self) -> bool {
        self.result_code == "0"
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// Daraja is inconsistent about numeric fields: sandbox returns codes as
// strings, some production responses return bare numbers.
fn string_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Normalize a caller-supplied phone number to a 254-prefixed MSISDN.
///
/// Accepts `07XXXXXXXX`, `01XXXXXXXX`, `7XXXXXXXX`, `+254...`, and bare
/// `254...` forms. Anything that does not end up as 12 digits starting with
/// 254 is rejected as invalid input.
pub fn normalize_msisdn(phone: &str) -> PaymentResult<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    let msisdn = if let Some(rest) = digits.strip_prefix('0') {
        format!("254{rest}")
    } else if digits.starts_with("254") {
        digits
    } else if digits.starts_with('7') || digits.starts_with('1') {
        format!("254{digits}")
    } else {
        digits
    };

    if msisdn.len() == 12 && msisdn.starts_with("254") {
        Ok(msisdn)
    } else {
        Err(PaymentError::InvalidInput(format!(
            "phone number '{phone}' does not normalize to a 254 MSISDN"
        )))
    }
}

fn format_timestamp(now: OffsetDateTime) -> PaymentResult<String> {
    now.format(TIMESTAMP_FORMAT)
        .map_err(|e| PaymentError::Internal(format!("timestamp formatting failed: {e}")))
}

fn derive_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64.encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// Daraja REST client
#[derive(Clone)]
pub struct MpesaClient {
    http: reqwest::Client,
    base_url: String,
    config: MpesaConfig,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        let base_url = config.env.base_url().to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            config,
        }
    }

    #[cfg(test)]
    fn with_base_url(config: MpesaConfig, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            config,
        }
    }

    async fn access_token(&self) -> PaymentResult<String> {
        let response = self
            .http
            .get(format!("{}/oauth/v1/generate", self.base_url))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(
                &self.config.consumer_key,
                Some(&self.config.consumer_secret),
            )
            .send()
            .await
            .map_err(|e| PaymentError::upstream("mpesa", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "Daraja token exchange failed");
            return Err(PaymentError::upstream(
                "mpesa",
                format!("token exchange returned {status}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("mpesa", e.to_string()))?;
        Ok(token.access_token)
    }

    /// Initiate an STK push prompt on the customer's phone.
    ///
    /// `phone` may be in any accepted local format; it is normalized before
    /// the request is built. `amount` is in whole KES.
    pub async fn stk_push(
        &self,
        phone: &str,
        amount: u64,
        account_reference: &str,
        description: &str,
    ) -> PaymentResult<StkPushResponse> {
        let msisdn = normalize_msisdn(phone)?;
        let token = self.access_token().await?;
        let timestamp = format_timestamp(OffsetDateTime::now_utc())?;
        let password = derive_password(&self.config.shortcode, &self.config.passkey, &timestamp);

        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": msisdn,
            "PartyB": self.config.shortcode,
            "PhoneNumber": msisdn,
            "CallBackURL": self.config.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": description,
        });

        let response = self
            .http
            .post(format!("{}/mpesa/stkpush/v1/processrequest", self.base_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::upstream("mpesa", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STK push request failed");
            return Err(PaymentError::upstream(
                "mpesa",
                format!("STK push returned {status}"),
            ));
        }

        let push: StkPushResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("mpesa", e.to_string()))?;

        if push.response_code != "0" {
            tracing::warn!(
                response_code = %push.response_code,
                description = %push.response_description,
                "STK push rejected by Daraja"
            );
            return Err(PaymentError::upstream(
                "mpesa",
                push.response_description.clone(),
            ));
        }

        tracing::info!(
            checkout_request_id = %push.checkout_request_id,
            amount = amount,
            "STK push accepted"
        );
        Ok(push)
    }

    /// Poll the outcome of a previously initiated STK push.
    ///
    /// The password is recomputed with a fresh timestamp; Daraja validates
    /// it against the shortcode's passkey, not against the push timestamp.
    pub async fn stk_query(&self, checkout_request_id: &str) -> PaymentResult<StkQueryResponse> {
        let token = self.access_token().await?;
        let timestamp = format_timestamp(OffsetDateTime::now_utc())?;
        let password = derive_password(&self.config.shortcode, &self.config.passkey, &timestamp);

        let body = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });

        let response = self
            .http
            .post(format!("{}/mpesa/stkpushquery/v1/query", self.base_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::upstream("mpesa", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STK query request failed");
            return Err(PaymentError::upstream(
                "mpesa",
                format!("STK query returned {status}"),
            ));
        }

        let query: StkQueryResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("mpesa", e.to_string()))?;

        tracing::info!(
            checkout_request_id = %checkout_request_id,
            result_code = %query.result_code,
            "STK query completed"
        );
        Ok(query)
    }
}
