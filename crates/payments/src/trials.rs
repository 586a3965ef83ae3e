//! Trial expiry enforcement
//!
//! The scheduled sweep and the self-service removal share the same
//! predicates from `bizos_shared::trial`; only the grace window differs
//! (`GracePolicy.sweep` vs `GracePolicy.self_service`). Deleting a tenant
//! cascades to subscription, deployment config, claims, and bookings.

use bizos_shared::{is_past_grace_period, GracePolicy};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};

/// Result of one sweep run
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub tenant_ids: Vec<Uuid>,
}

impl SweepOutcome {
    pub fn removed(&self) -> usize {
        self.tenant_ids.len()
    }
}

/// Removes tenants whose free trial has run past its grace window
#[derive(Clone)]
pub struct TrialService {
    pool: PgPool,
    policy: GracePolicy,
}

impl TrialService {
    pub fn new(pool: PgPool, policy: GracePolicy) -> Self {
        Self { pool, policy }
    }

    /// Delete every free-plan tenant past the sweep grace window.
    ///
    /// Individual delete failures are logged and skipped so one bad row
    /// cannot stall the whole sweep.
    pub async fn sweep_expired(&self) -> PaymentResult<SweepOutcome> {
        let now = OffsetDateTime::now_utc();
        let candidates: Vec<(Uuid, OffsetDateTime)> = sqlx::query_as(
            r#"
            SELECT tenant_id, trial_ends_at
            FROM tenant_subscriptions
            WHERE plan = 'free' AND trial_ends_at IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let expired = past_grace_tenants(now, &candidates, self.policy.sweep);
        tracing::info!(
            candidates = candidates.len(),
            expired = expired.len(),
            grace_days = self.policy.sweep.whole_days(),
            "Trial sweep evaluated"
        );

        let mut outcome = SweepOutcome::default();
        for tenant_id in expired {
            match self.delete_tenant(tenant_id).await {
                Ok(()) => outcome.tenant_ids.push(tenant_id),
                Err(e) => {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        error = %e,
                        "Failed to remove expired-trial tenant, skipping"
                    );
                }
            }
        }

        if outcome.removed() > 0 {
            tracing::info!(removed = outcome.removed(), "Trial sweep removed tenants");
        }
        Ok(outcome)
    }

    /// Self-service removal for the caller's own tenant.
    ///
    /// Resolves the tenant through the caller's `tenant_owner` role, then
    /// applies the shorter self-service grace window. Returns whether the
    /// tenant was removed.
    pub async fn remove_for_owner(&self, user_id: Uuid) -> PaymentResult<bool> {
        let owned: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT tenant_id
            FROM user_roles
            WHERE user_id = $1 AND role = 'tenant_owner' AND tenant_id IS NOT NULL
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (tenant_id,) = owned.ok_or_else(|| {
            PaymentError::NotFound("no tenant owned by this account".to_string())
        })?;

        let trial: Option<(Option<OffsetDateTime>,)> = sqlx::query_as(
            r#"
            SELECT trial_ends_at
            FROM tenant_subscriptions
            WHERE tenant_id = $1 AND plan = 'free'
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let ends_at = match trial {
            Some((Some(ends_at),)) => ends_at,
            _ => return Ok(false),
        };

        let now = OffsetDateTime::now_utc();
        if !is_past_grace_period(now, ends_at, self.policy.self_service) {
            return Ok(false);
        }

        self.delete_tenant(tenant_id).await?;
        tracing::info!(
            tenant_id = %tenant_id,
            user_id = %user_id,
            "Removed expired-trial tenant at owner's request"
        );
        Ok(true)
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> PaymentResult<()> {
        sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn past_grace_tenants(
    now: OffsetDateTime,
    rows: &[(Uuid, OffsetDateTime)],
    grace: Duration,
) -> Vec<Uuid> {
    rows.iter()
        .filter(|(_, ends_at)| is_past_grace_period(now, *ends_at, grace))
        .map(|(tenant_id, _)| *tenant_id)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn sweep_filter_keeps_tenants_inside_grace() {
        let now = datetime!(2025-06-10 12:00:00 UTC);
        let grace = Duration::days(7);

        let past_grace = Uuid::new_v4();
        let in_grace = Uuid::new_v4();
        let not_expired = Uuid::new_v4();
        let rows = vec![
            (past_grace, datetime!(2025-06-01 12:00:00 UTC)),
            (in_grace, datetime!(2025-06-05 12:00:00 UTC)),
            (not_expired, datetime!(2025-06-20 12:00:00 UTC)),
        ];

        let expired = past_grace_tenants(now, &rows, grace);
        assert_eq!(expired, vec![past_grace]);
    }

    #[test]
    fn sweep_filter_boundary_is_exclusive() {
        let ends_at = datetime!(2025-06-01 12:00:00 UTC);
        let grace = Duration::days(7);
        let tenant = Uuid::new_v4();
        let rows = vec![(tenant, ends_at)];

        let at_boundary = past_grace_tenants(ends_at + grace, &rows, grace);
        assert!(at_boundary.is_empty());

        let past_boundary =
            past_grace_tenants(ends_at + grace + Duration::seconds(1), &rows, grace);
        assert_eq!(past_boundary, vec![tenant]);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn sweep_removes_only_past_grace_free_trials() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        let service = TrialService::new(pool.clone(), GracePolicy::default());

        let mut seeded = Vec::new();
        // (days since trial end, should be swept with the default 7-day grace)
        for (days_ago, expect_swept) in [(10_i64, true), (5, false)] {
            let slug = format!("biz-trial{}", Uuid::new_v4().simple());
            let tenant: (Uuid,) = sqlx::query_as(
                r#"
                INSERT INTO tenants (slug, name, subscription_plan)
                VALUES ($1, 'Trial Business', 'free')
                RETURNING id
                "#,
            )
            .bind(&slug)
            .fetch_one(&pool)
            .await
            .unwrap();

            sqlx::query(
                r#"
                INSERT INTO tenant_subscriptions (tenant_id, plan, status, trial_ends_at)
                VALUES ($1, 'free', 'active', NOW() - ($2 || ' days')::INTERVAL)
                "#,
            )
            .bind(tenant.0)
            .bind(days_ago.to_string())
            .execute(&pool)
            .await
            .unwrap();
            seeded.push((tenant.0, expect_swept));
        }

        let outcome = service.sweep_expired().await.unwrap();
        for (tenant_id, expect_swept) in &seeded {
            assert_eq!(outcome.tenant_ids.contains(tenant_id), *expect_swept);
            let remains: (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE id = $1")
                    .bind(tenant_id)
                    .fetch_one(&pool)
                    .await
                    .unwrap();
            assert_eq!(remains.0 == 0, *expect_swept);
        }

        for (tenant_id, _) in seeded {
            sqlx::query("DELETE FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .execute(&pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn owner_removal_uses_self_service_grace() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = sqlx::PgPool::connect(&url).await.unwrap();
        let service = TrialService::new(pool.clone(), GracePolicy::default());

        let slug = format!("biz-owner{}", Uuid::new_v4().simple());
        let tenant: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tenants (slug, name, subscription_plan)
            VALUES ($1, 'Owner Business', 'free')
            RETURNING id
            "#,
        )
        .bind(&slug)
        .fetch_one(&pool)
        .await
        .unwrap();

        // 4 days past trial end: past the 3-day self-service grace,
        // inside the 7-day sweep grace
        sqlx::query(
            r#"
            INSERT INTO tenant_subscriptions (tenant_id, plan, status, trial_ends_at)
            VALUES ($1, 'free', 'active', NOW() - INTERVAL '4 days')
            "#,
        )
        .bind(tenant.0)
        .execute(&pool)
        .await
        .unwrap();

        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO user_roles (user_id, role, tenant_id) VALUES ($1, 'tenant_owner', $2)",
        )
        .bind(user_id)
        .bind(tenant.0)
        .execute(&pool)
        .await
        .unwrap();

        let removed = service.remove_for_owner(user_id).await.unwrap();
        assert!(removed);

        let remains: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE id = $1")
            .bind(tenant.0)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remains.0, 0);
    }
}
