//! Checkout-to-tenant claims
//!
//! A tenant is provisioned anonymously at payment time; the payer links
//! their authenticated account to it afterwards. Stripe claims resolve by
//! checkout session id, PayPal claims by the caller's account email (PayPal
//! capture events carry no session correlation). Claim ownership is
//! write-once and the owner-role grant is idempotent across repeat calls.

use bizos_shared::CoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};

/// Hint returned when no claim row exists yet. Webhook delivery can lag the
/// redirect back from checkout, so the caller should retry.
const RETRY_HINT: &str = "payment not yet processed, retry shortly";

#[derive(Debug, Clone, sqlx::FromRow)]
struct ClaimRow {
    id: Uuid,
    tenant_id: Uuid,
    claimed_by_user_id: Option<Uuid>,
}

/// Links authenticated users to tenants provisioned at payment time
#[derive(Clone)]
pub struct ClaimService {
    pool: PgPool,
}

impl ClaimService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim the tenant provisioned for a Stripe checkout session
    pub async fn claim_stripe(&self, user_id: Uuid, session_id: &str) -> PaymentResult<Uuid> {
        let row: Option<ClaimRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, claimed_by_user_id
            FROM stripe_checkout_claims
            WHERE stripe_session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| PaymentError::NotFound(RETRY_HINT.to_string()))?;
        self.take_ownership("stripe_checkout_claims", row, user_id)
            .await
    }

    /// Claim the most recent unclaimed PayPal purchase matching the caller's
    /// account email. When no unclaimed purchase is waiting, repeat calls
    /// return the tenant most recently claimed by this user, so a retried
    /// claim stays idempotent without blocking later purchases.
    pub async fn claim_paypal(&self, user_id: Uuid, user_email: &str) -> PaymentResult<Uuid> {
        let unclaimed: Option<ClaimRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, claimed_by_user_id
            FROM paypal_checkout_claims
            WHERE customer_email = $1 AND claimed_by_user_id IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_email)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = unclaimed {
            return self
                .take_ownership("paypal_checkout_claims", row, user_id)
                .await;
        }

        let mine: Option<ClaimRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, claimed_by_user_id
            FROM paypal_checkout_claims
            WHERE claimed_by_user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = mine.ok_or_else(|| PaymentError::NotFound(RETRY_HINT.to_string()))?;
        let tenant_id = row.tenant_id;
        self.grant_tenant_owner(user_id, tenant_id).await?;
        Ok(tenant_id)
    }

    /// Set `claimed_by_user_id` write-once, then grant the owner role.
    ///
    /// The UPDATE is guarded by `claimed_by_user_id IS NULL`, so two users
    /// racing for the same row cannot both win; the loser sees zero rows
    /// updated and fails with AlreadyClaimed.
    async fn take_ownership(
        &self,
        table: &'static str,
        row: ClaimRow,
        user_id: Uuid,
    ) -> PaymentResult<Uuid> {
        match row.claimed_by_user_id {
            Some(owner) if owner == user_id => {
                self.grant_tenant_owner(user_id, row.tenant_id).await?;
                return Ok(row.tenant_id);
            }
            Some(_) => return Err(PaymentError::AlreadyClaimed),
            None => {}
        }

        let sql = format!(
            "UPDATE {table} SET claimed_by_user_id = $1 WHERE id = $2 AND claimed_by_user_id IS NULL"
        );
        let updated = sqlx::query(&sql)
            .bind(user_id)
            .bind(row.id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            tracing::warn!(
                claim_id = %row.id,
                user_id = %user_id,
                "Claim lost to a concurrent caller"
            );
            return Err(PaymentError::AlreadyClaimed);
        }

        self.grant_tenant_owner(user_id, row.tenant_id).await?;
        tracing::info!(
            claim_id = %row.id,
            tenant_id = %row.tenant_id,
            user_id = %user_id,
            "Claim linked to user"
        );
        Ok(row.tenant_id)
    }

    /// Grant `tenant_owner` for (user, tenant) exactly once.
    ///
    /// Check-then-insert, with the unique index catching the race between
    /// the check and the insert.
    async fn grant_tenant_owner(&self, user_id: Uuid, tenant_id: Uuid) -> PaymentResult<()> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM user_roles
            WHERE user_id = $1 AND role = 'tenant_owner' AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Ok(());
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role, tenant_id)
            VALUES ($1, 'tenant_owner', $2)
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::info!(
                    user_id = %user_id,
                    tenant_id = %tenant_id,
                    "Granted tenant_owner role"
                );
                Ok(())
            }
            Err(e) if CoreError::is_unique_violation(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").unwrap();
        sqlx::PgPool::connect(&url).await.unwrap()
    }

    async fn seed_tenant(pool: &PgPool) -> Uuid {
        let slug = format!("biz-test{}", Uuid::new_v4().simple());
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tenants (slug, name, subscription_plan)
            VALUES ($1, 'Test Business', 'starter')
            RETURNING id
            "#,
        )
        .bind(&slug)
        .fetch_one(pool)
        .await
        .unwrap();
        row.0
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn stripe_claim_is_write_once() {
        let pool = test_pool().await;
        let service = ClaimService::new(pool.clone());
        let tenant_id = seed_tenant(&pool).await;

        let session_id = format!("cs_test_{}", Uuid::new_v4().simple());
        sqlx::query(
            r#"
            INSERT INTO stripe_checkout_claims
                (stripe_session_id, tenant_id, customer_email, plan_type)
            VALUES ($1, $2, 'jane@x.com', 'starter')
            "#,
        )
        .bind(&session_id)
        .bind(tenant_id)
        .execute(&pool)
        .await
        .unwrap();

        let first_user = Uuid::new_v4();
        let second_user = Uuid::new_v4();

        let claimed = service.claim_stripe(first_user, &session_id).await.unwrap();
        assert_eq!(claimed, tenant_id);

        // Same user again: idempotent, no duplicate role row
        let again = service.claim_stripe(first_user, &session_id).await.unwrap();
        assert_eq!(again, tenant_id);
        let roles: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_roles WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(first_user)
        .bind(tenant_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(roles.0, 1);

        // Different user: ownership must not move
        let err = service
            .claim_stripe(second_user, &session_id)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyClaimed));

        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn paypal_claim_matches_most_recent_unclaimed_by_email() {
        let pool = test_pool().await;
        let service = ClaimService::new(pool.clone());
        let older_tenant = seed_tenant(&pool).await;
        let newer_tenant = seed_tenant(&pool).await;

        let email = format!("{}@x.com", Uuid::new_v4().simple());
        for (tenant_id, offset) in [(older_tenant, "2 hours"), (newer_tenant, "1 hour")] {
            sqlx::query(&format!(
                r#"
                INSERT INTO paypal_checkout_claims
                    (paypal_capture_id, tenant_id, customer_email, plan_type, created_at)
                VALUES ($1, $2, $3, 'starter', NOW() - INTERVAL '{offset}')
                "#,
            ))
            .bind(format!("CAP{}", Uuid::new_v4().simple()))
            .bind(tenant_id)
            .bind(&email)
            .execute(&pool)
            .await
            .unwrap();
        }

        let user = Uuid::new_v4();
        let claimed = service.claim_paypal(user, &email).await.unwrap();
        assert_eq!(claimed, newer_tenant);

        // A second purchase is still waiting, so the next call claims it
        // instead of echoing the first tenant
        let second_purchase = service.claim_paypal(user, &email).await.unwrap();
        assert_eq!(second_purchase, older_tenant);

        // Nothing unclaimed left: the call is idempotent on the most recent
        // claim rather than an error
        let again = service.claim_paypal(user, &email).await.unwrap();
        assert_eq!(again, newer_tenant);

        for tenant_id in [older_tenant, newer_tenant] {
            sqlx::query("DELETE FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .execute(&pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn missing_claim_returns_retry_hint() {
        let pool = test_pool().await;
        let service = ClaimService::new(pool);
        let err = service
            .claim_stripe(Uuid::new_v4(), "cs_test_does_not_exist")
            .await
            .unwrap_err();
        match err {
            PaymentError::NotFound(hint) => assert_eq!(hint, RETRY_HINT),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
