//! Payment error types

use thiserror::Error;

/// Payment-specific errors
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("{provider} error: {message}")]
    Upstream { provider: &'static str, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Webhook signature verification failed")]
    SignatureInvalid,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already claimed by another account")]
    AlreadyClaimed,

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("No free slug available after {0} suffix attempts")]
    SlugExhausted(usize),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Shorthand for provider-call failures. Provider bodies are logged at
    /// the call site, never forwarded to clients.
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(err: sqlx::Error) -> Self {
        if bizos_shared::CoreError::is_unique_violation(&err) {
            return PaymentError::AlreadyExists(err.to_string());
        }
        PaymentError::Database(err.to_string())
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;
