//! Error types shared across BizOS crates

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// True when the error came from a Postgres unique-constraint violation.
    /// Idempotent inserts treat this as "row already exists", not a failure.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err.as_database_error().and_then(|e| e.code()),
            Some(code) if code == "23505"
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_context() {
        let err = CoreError::NotConfigured("STRIPE_SECRET_KEY".to_string());
        assert_eq!(err.to_string(), "Not configured: STRIPE_SECRET_KEY");

        let err = CoreError::NotFound("tenant".to_string());
        assert_eq!(err.to_string(), "Not found: tenant");
    }
}
