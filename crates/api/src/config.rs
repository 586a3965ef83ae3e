//! Application configuration

use std::env;

/// Application configuration loaded from environment variables.
///
/// Provider secrets (Stripe/PayPal/M-Pesa keys) are deliberately absent:
/// they are resolved per request by the credential resolver, which prefers
/// tenant-scoped settings over the process environment. Only mode flags and
/// platform-level settings live here.
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    /// Base domain for subdomain routing, e.g. "bizos.app" for *.bizos.app
    pub base_domain: String,

    // Database
    pub database_url: String,

    // Authentication
    /// HS256 secret the platform auth service signs user tokens with
    pub auth_jwt_secret: String,
    /// Shared secret authorizing service-role calls (trial sweep trigger)
    pub service_role_key: String,

    // Provider mode flags (secrets go through the credential resolver)
    pub paypal_mode: String,
    pub mpesa_env: String,
    pub mpesa_callback_url: String,

    // Email
    pub resend_api_key: String,
    pub resend_from_email: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: {
                let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
                format!("0.0.0.0:{port}")
            },
            base_domain: env::var("PLATFORM_BASE_DOMAIN")
                .unwrap_or_else(|_| "localhost".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            auth_jwt_secret: {
                let secret = env::var("AUTH_JWT_SECRET")
                    .map_err(|_| ConfigError::Missing("AUTH_JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "AUTH_JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            service_role_key: {
                let key = env::var("SERVICE_ROLE_KEY")
                    .map_err(|_| ConfigError::Missing("SERVICE_ROLE_KEY"))?;
                if key.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "SERVICE_ROLE_KEY must be at least 32 characters",
                    ));
                }
                key
            },

            paypal_mode: env::var("PAYPAL_MODE").unwrap_or_else(|_| "sandbox".to_string()),
            mpesa_env: env::var("MPESA_ENV").unwrap_or_else(|_| "sandbox".to_string()),
            mpesa_callback_url: env::var("MPESA_CALLBACK_URL").unwrap_or_default(),

            resend_api_key: env::var("RESEND_API_KEY").unwrap_or_default(),
            resend_from_email: env::var("RESEND_FROM_EMAIL")
                .unwrap_or_else(|_| "BizOS <noreply@localhost>".to_string()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "AUTH_JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters",
        );
        env::set_var(
            "SERVICE_ROLE_KEY",
            "test-service-role-key-at-least-32-chars",
        );
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("AUTH_JWT_SECRET");
        env::remove_var("SERVICE_ROLE_KEY");
        env::remove_var("PORT");
        env::remove_var("PAYPAL_MODE");
    }

    #[test]
    #[serial]
    fn test_missing_database_url_is_named() {
        cleanup_config();
        setup_minimal_config();
        env::remove_var("DATABASE_URL");

        match Config::from_env() {
            Err(ConfigError::Missing("DATABASE_URL")) => {}
            other => panic!("expected Missing(DATABASE_URL), got {other:?}"),
        }
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_short_jwt_secret_rejected() {
        setup_minimal_config();
        env::set_var("AUTH_JWT_SECRET", "too-short");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::WeakSecret(_))
        ));
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_defaults_apply() {
        setup_minimal_config();
        env::set_var("PORT", "8080");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.paypal_mode, "sandbox");
        assert_eq!(config.mpesa_env, "sandbox");
        assert_eq!(config.base_domain, "localhost");
        assert!(config.resend_api_key.is_empty());
        cleanup_config();
    }
}
