//! PayPal Orders API client
//!
//! Every operation performs its own OAuth2 client-credentials exchange.
//! PayPal access tokens are valid for hours, but webhook and checkout
//! traffic is low enough that re-authenticating per call keeps the client
//! stateless and avoids token refresh bookkeeping.

use serde::Deserialize;
use serde_json::json;

use crate::error::{PaymentError, PaymentResult};

/// Which PayPal environment to call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalMode {
    Sandbox,
    Live,
}

impl PayPalMode {
    /// Parse the `PAYPAL_MODE` setting. Anything other than `live` is
    /// treated as sandbox so a misconfigured flag cannot hit production.
    pub fn from_mode_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "live" => Self::Live,
            _ => Self::Sandbox,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

/// PayPal credentials for one resolved scope
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub mode: PayPalMode,
}

/// Outcome of an order capture
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub status: String,
    pub details: serde_json::Value,
}

impl CaptureOutcome {
    pub fn completed(&self) -> bool {
        self.status == "COMPLETED"
    }
}

/// Webhook event envelope as delivered by PayPal
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalWebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    #[serde(default)]
    status: String,
    #[serde(flatten)]
    rest: serde_json::Value,
}

/// PayPal REST client
#[derive(Clone)]
pub struct PayPalClient {
    http: reqwest::Client,
    base_url: String,
    config: PayPalConfig,
}

impl PayPalClient {
    pub fn new(config: PayPalConfig) -> Self {
        let base_url = config.mode.base_url().to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            config,
        }
    }

    #[cfg(test)]
    fn with_base_url(config: PayPalConfig, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            config,
        }
    }

    /// Exchange client credentials for a short-lived access token
    async fn access_token(&self) -> PaymentResult<String> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PaymentError::upstream("paypal", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, "PayPal token exchange failed");
            return Err(PaymentError::upstream(
                "paypal",
                format!("token exchange returned {status}"),
            ));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("paypal", e.to_string()))?;
        Ok(token.access_token)
    }

    /// Create a CAPTURE-intent order for the given amount.
    ///
    /// `value` is the decimal major-unit string PayPal expects, e.g. "45.00".
    pub async fn create_order(&self, value: &str, currency_code: &str) -> PaymentResult<String> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": currency_code,
                    "value": value,
                }
            }]
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::upstream("paypal", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "PayPal order creation failed");
            return Err(PaymentError::upstream(
                "paypal",
                format!("order creation returned {status}"),
            ));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("paypal", e.to_string()))?;

        tracing::info!(order_id = %order.id, "Created PayPal order");
        Ok(order.id)
    }

    /// Capture a previously created order
    pub async fn capture_order(&self, order_id: &str) -> PaymentResult<CaptureOutcome> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, order_id
            ))
            .bearer_auth(&token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| PaymentError::upstream("paypal", e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %body,
                order_id = %order_id,
                "PayPal order capture failed"
            );
            return Err(PaymentError::upstream(
                "paypal",
                format!("order capture returned {status}"),
            ));
        }

        let capture: CaptureResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::upstream("paypal", e.to_string()))?;

        tracing::info!(
            order_id = %order_id,
            status = %capture.status,
            "Captured PayPal order"
        );

        let mut details = capture.rest;
        if let Some(object) = details.as_object_mut() {
            object.insert("status".to_string(), json!(capture.status));
        }
        Ok(CaptureOutcome {
            status: capture.status,
            details,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_config() -> PayPalConfig {
        PayPalConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            mode: PayPalMode::Sandbox,
        }
    }

    async fn mock_token(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/v1/oauth2/token")
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "client_credentials".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"A21.token","token_type":"Bearer","expires_in":32400}"#)
            .create_async()
            .await
    }

    #[test]
    fn mode_selects_base_url() {
        assert_eq!(
            PayPalMode::from_mode_str("live").base_url(),
            "https://api-m.paypal.com"
        );
        assert_eq!(
            PayPalMode::from_mode_str("sandbox").base_url(),
            "https://api-m.sandbox.paypal.com"
        );
        assert_eq!(PayPalMode::from_mode_str("LIVE"), PayPalMode::Live);
        assert_eq!(PayPalMode::from_mode_str("anything"), PayPalMode::Sandbox);
        assert_eq!(PayPalMode::from_mode_str(""), PayPalMode::Sandbox);
    }

    #[test]
    fn capture_outcome_completed_only_for_completed_status() {
        let done = CaptureOutcome {
            status: "COMPLETED".to_string(),
            details: serde_json::Value::Null,
        };
        let declined = CaptureOutcome {
            status: "DECLINED".to_string(),
            details: serde_json::Value::Null,
        };
        assert!(done.completed());
        assert!(!declined.completed());
    }

    #[test]
    fn webhook_event_parses_capture_resource() {
        let event: PayPalWebhookEvent = serde_json::from_str(
            r#"{
                "id": "WH-123",
                "event_type": "PAYMENT.CAPTURE.COMPLETED",
                "resource": {
                    "id": "CAP123",
                    "amount": {"currency_code": "USD", "value": "45.00"},
                    "payer": {"email_address": "jane@x.com"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "PAYMENT.CAPTURE.COMPLETED");
        assert_eq!(event.resource["id"], "CAP123");
        assert_eq!(event.resource["payer"]["email_address"], "jane@x.com");
    }

    #[tokio::test]
    async fn create_order_exchanges_token_then_posts_order() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = mock_token(&mut server).await;
        let order_mock = server
            .mock("POST", "/v2/checkout/orders")
            .match_header("authorization", "Bearer A21.token")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "intent": "CAPTURE",
                "purchase_units": [{"amount": {"currency_code": "USD", "value": "45.00"}}]
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"ORDER123","status":"CREATED"}"#)
            .create_async()
            .await;

        let client = PayPalClient::with_base_url(test_config(), server.url());
        let order_id = client.create_order("45.00", "USD").await.unwrap();
        assert_eq!(order_id, "ORDER123");
        token_mock.assert_async().await;
        order_mock.assert_async().await;
    }

    #[tokio::test]
    async fn capture_order_reports_completed_status() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("POST", "/v2/checkout/orders/ORDER123/capture")
            .match_header("authorization", "Bearer A21.token")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"ORDER123","status":"COMPLETED","payer":{"email_address":"jane@x.com"}}"#,
            )
            .create_async()
            .await;

        let client = PayPalClient::with_base_url(test_config(), server.url());
        let outcome = client.capture_order("ORDER123").await.unwrap();
        assert!(outcome.completed());
        assert_eq!(outcome.details["payer"]["email_address"], "jane@x.com");
        assert_eq!(outcome.details["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn failed_token_exchange_maps_to_upstream() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/oauth2/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client"}"#)
            .create_async()
            .await;

        let client = PayPalClient::with_base_url(test_config(), server.url());
        let err = client.create_order("45.00", "USD").await.unwrap_err();
        match err {
            PaymentError::Upstream { provider, .. } => assert_eq!(provider, "paypal"),
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn capture_failure_maps_to_upstream() {
        let mut server = mockito::Server::new_async().await;
        mock_token(&mut server).await;
        server
            .mock("POST", "/v2/checkout/orders/ORDER123/capture")
            .with_status(422)
            .with_body(r#"{"name":"UNPROCESSABLE_ENTITY"}"#)
            .create_async()
            .await;

        let client = PayPalClient::with_base_url(test_config(), server.url());
        let err = client.capture_order("ORDER123").await.unwrap_err();
        assert!(matches!(err, PaymentError::Upstream { .. }));
    }
}
