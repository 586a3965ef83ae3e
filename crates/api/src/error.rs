//! API error types and handling

use axum::{
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bizos_payments::PaymentError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InputInvalid(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Resource already exists: {0}")]
    Conflict(String),
    #[error("Payment provider error: {0}")]
    UpstreamFailure(String),
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("Internal server error")]
    InternalFailure,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::InputInvalid(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::UpstreamFailure(msg) => {
                (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE", msg.clone())
            }
            ApiError::NotConfigured(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_CONFIGURED",
                msg.clone(),
            ),
            ApiError::InternalFailure => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("resource".to_string()),
            _ => ApiError::InternalFailure,
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured(key) => {
                ApiError::NotConfigured(format!("payment provider not configured: {key}"))
            }
            PaymentError::Upstream { provider, message } => {
                ApiError::UpstreamFailure(format!("{provider}: {message}"))
            }
            PaymentError::InvalidInput(msg) => ApiError::InputInvalid(msg),
            PaymentError::SignatureInvalid => {
                ApiError::InputInvalid("invalid webhook signature".to_string())
            }
            PaymentError::NotFound(msg) => ApiError::NotFound(msg),
            PaymentError::AlreadyClaimed => {
                ApiError::Conflict("tenant already claimed by another account".to_string())
            }
            PaymentError::AlreadyExists(msg) => ApiError::Conflict(msg),
            PaymentError::SlugExhausted(_)
            | PaymentError::Database(_)
            | PaymentError::Internal(_) => {
                tracing::error!(error = %err, "Payment service failure");
                ApiError::InternalFailure
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// JSON extractor whose rejection is the standard error envelope.
///
/// Axum's `Json` rejects malformed bodies with plain text; every endpoint
/// here must answer with the `{"error": {...}}` shape instead.
#[derive(Debug)]
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(ApiError::InputInvalid(rejection.body_text())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            status_of(ApiError::InputInvalid("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(ApiError::NotFound("booking".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::UpstreamFailure("stripe: 500".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ApiError::NotConfigured("STRIPE_SECRET_KEY".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(ApiError::InternalFailure),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_payment_errors_map_to_taxonomy() {
        assert!(matches!(
            ApiError::from(PaymentError::NotConfigured("K".into())),
            ApiError::NotConfigured(_)
        ));
        assert!(matches!(
            ApiError::from(PaymentError::upstream("paypal", "boom")),
            ApiError::UpstreamFailure(_)
        ));
        assert!(matches!(
            ApiError::from(PaymentError::SignatureInvalid),
            ApiError::InputInvalid(_)
        ));
        assert!(matches!(
            ApiError::from(PaymentError::AlreadyClaimed),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(PaymentError::SlugExhausted(10)),
            ApiError::InternalFailure
        ));
    }

    #[test]
    fn test_internal_errors_do_not_leak_details() {
        let response = ApiError::from(PaymentError::Database("secret dsn".into()));
        assert_eq!(response.to_string(), "Internal server error");
    }

    #[derive(Debug, serde::Deserialize)]
    struct Payload {
        amount: i64,
    }

    fn json_request(body: &'static str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_app_json_extracts_valid_bodies() {
        let AppJson(payload) = AppJson::<Payload>::from_request(
            json_request(r#"{"amount": 4500}"#),
            &(),
        )
        .await
        .unwrap();
        assert_eq!(payload.amount, 4500);
    }

    #[tokio::test]
    async fn test_app_json_rejects_with_error_envelope() {
        let err = AppJson::<Payload>::from_request(json_request("not json"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InputInvalid(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
