//! Tenant-scoped payment credential resolution
//!
//! Tenants may bring their own provider accounts; those keys live in the
//! `tenant_settings` table. A tenant's key set wins only when every requested
//! key is present; otherwise the platform's environment defaults apply.
//! A key missing from both layers is a NotConfigured failure (503 downstream),
//! distinct from provider or database failures.

use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};

// Canonical setting keys. Tenant settings and platform environment
// variables use the same names.
pub const STRIPE_SECRET_KEY: &str = "STRIPE_SECRET_KEY";
pub const STRIPE_WEBHOOK_SECRET: &str = "STRIPE_WEBHOOK_SECRET";
pub const PAYPAL_CLIENT_ID: &str = "PAYPAL_CLIENT_ID";
pub const PAYPAL_CLIENT_SECRET: &str = "PAYPAL_CLIENT_SECRET";
pub const MPESA_CONSUMER_KEY: &str = "MPESA_CONSUMER_KEY";
pub const MPESA_CONSUMER_SECRET: &str = "MPESA_CONSUMER_SECRET";
pub const MPESA_SHORTCODE: &str = "MPESA_SHORTCODE";
pub const MPESA_PASSKEY: &str = "MPESA_PASSKEY";

/// Read-only resolver for provider credentials
#[derive(Clone)]
pub struct CredentialResolver {
    pool: PgPool,
}

impl CredentialResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the requested keys for an optional tenant scope.
    ///
    /// All-or-nothing per layer: a partial tenant key set does not mix with
    /// environment values.
    pub async fn resolve(
        &self,
        tenant_id: Option<Uuid>,
        keys: &[&str],
    ) -> PaymentResult<HashMap<String, String>> {
        if let Some(tenant_id) = tenant_id {
            let wanted: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            let rows: Vec<(String, String)> = sqlx::query_as(
                r#"
                SELECT key, value
                FROM tenant_settings
                WHERE tenant_id = $1 AND key = ANY($2)
                "#,
            )
            .bind(tenant_id)
            .bind(&wanted)
            .fetch_all(&self.pool)
            .await?;

            let found: HashMap<String, String> = rows
                .into_iter()
                .filter(|(_, value)| !value.is_empty())
                .collect();

            if keys.iter().all(|key| found.contains_key(*key)) {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    keys = keys.len(),
                    "Resolved tenant-scoped payment credentials"
                );
                return Ok(found);
            }

            tracing::debug!(
                tenant_id = %tenant_id,
                "Tenant credential set incomplete, falling back to platform defaults"
            );
        }

        Self::from_environment(keys)
    }

    /// Platform-wide defaults from the process environment
    fn from_environment(keys: &[&str]) -> PaymentResult<HashMap<String, String>> {
        let mut values = HashMap::with_capacity(keys.len());
        for key in keys {
            match std::env::var(key) {
                Ok(value) if !value.is_empty() => {
                    values.insert((*key).to_string(), value);
                }
                _ => return Err(PaymentError::NotConfigured((*key).to_string())),
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_fallback_returns_all_requested_keys() {
        std::env::set_var("TEST_CRED_A", "alpha");
        std::env::set_var("TEST_CRED_B", "beta");

        let values =
            CredentialResolver::from_environment(&["TEST_CRED_A", "TEST_CRED_B"]).unwrap();
        assert_eq!(values.get("TEST_CRED_A").map(String::as_str), Some("alpha"));
        assert_eq!(values.get("TEST_CRED_B").map(String::as_str), Some("beta"));

        std::env::remove_var("TEST_CRED_A");
        std::env::remove_var("TEST_CRED_B");
    }

    #[test]
    #[serial]
    fn env_fallback_fails_with_missing_key_name() {
        std::env::set_var("TEST_CRED_PRESENT", "x");
        std::env::remove_var("TEST_CRED_ABSENT");

        let err =
            CredentialResolver::from_environment(&["TEST_CRED_PRESENT", "TEST_CRED_ABSENT"])
                .unwrap_err();
        match err {
            PaymentError::NotConfigured(key) => assert_eq!(key, "TEST_CRED_ABSENT"),
            other => panic!("expected NotConfigured, got {other:?}"),
        }

        std::env::remove_var("TEST_CRED_PRESENT");
    }

    #[test]
    #[serial]
    fn env_fallback_treats_empty_as_missing() {
        std::env::set_var("TEST_CRED_EMPTY", "");
        let err = CredentialResolver::from_environment(&["TEST_CRED_EMPTY"]).unwrap_err();
        assert!(matches!(err, PaymentError::NotConfigured(_)));
        std::env::remove_var("TEST_CRED_EMPTY");
    }
}
