//! Tenant provisioning saga
//!
//! Converts a successful payment event into a tenant, subscription,
//! deployment config, and claim-ledger row. The store sits behind a
//! transaction pooler, so the four inserts run as a saga with explicit
//! compensations rather than one transaction. Idempotency under
//! at-least-once webhook delivery rests on the claim table's unique key:
//! a conflict on the final insert means a concurrent delivery already
//! provisioned, and this saga's rows are rolled back in favor of theirs.

use bizos_shared::SubscriptionPlan;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};

/// Suffix probes after the base slug before provisioning gives up
const SLUG_SUFFIX_ATTEMPTS: usize = 10;

/// Free plans must carry a trial end (paid plans never expire by trial)
const FREE_TRIAL_DAYS: i64 = 14;

/// External payment identifier that deduplicates webhook deliveries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyKey {
    /// Stripe checkout session id (`cs_...`)
    StripeSession(String),
    /// PayPal capture id from a `PAYMENT.CAPTURE.COMPLETED` event
    PaypalCapture(String),
}

impl IdempotencyKey {
    pub fn value(&self) -> &str {
        match self {
            Self::StripeSession(id) | Self::PaypalCapture(id) => id,
        }
    }

    fn claim_table(&self) -> &'static str {
        match self {
            Self::StripeSession(_) => "stripe_checkout_claims",
            Self::PaypalCapture(_) => "paypal_checkout_claims",
        }
    }

    fn key_column(&self) -> &'static str {
        match self {
            Self::StripeSession(_) => "stripe_session_id",
            Self::PaypalCapture(_) => "paypal_capture_id",
        }
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StripeSession(id) => write!(f, "stripe:{id}"),
            Self::PaypalCapture(id) => write!(f, "paypal:{id}"),
        }
    }
}

/// Orchestrates tenant creation from payment events
#[derive(Clone)]
pub struct ProvisioningService {
    pool: PgPool,
}

impl ProvisioningService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotently provision a tenant for a successful payment.
    ///
    /// Returns the tenant id, whether created by this call or an earlier
    /// delivery of the same event.
    pub async fn provision(
        &self,
        key: &IdempotencyKey,
        customer_email: Option<&str>,
        plan: SubscriptionPlan,
    ) -> PaymentResult<Uuid> {
        if let Some(existing) = self.find_claim(key).await? {
            tracing::info!(
                key = %key,
                tenant_id = %existing,
                "Provisioning request already fulfilled"
            );
            return Ok(existing);
        }

        let slug = self.allocate_slug(key).await?;
        let name = derive_display_name(customer_email);

        let tenant_id = self.insert_tenant(&slug, &name, plan).await?;

        if let Err(e) = self.insert_subscription(tenant_id, plan).await {
            tracing::error!(
                tenant_id = %tenant_id,
                error = %e,
                "Subscription insert failed, rolling back tenant"
            );
            self.compensate_tenant(tenant_id).await;
            return Err(e);
        }

        if let Err(e) = self.insert_deployment_config(tenant_id).await {
            tracing::error!(
                tenant_id = %tenant_id,
                error = %e,
                "Deployment config insert failed, rolling back tenant"
            );
            self.compensate_tenant(tenant_id).await;
            return Err(e);
        }

        let email = customer_email.unwrap_or_default();
        match self.insert_claim(key, tenant_id, email, plan).await? {
            Some(_) => {
                tracing::info!(
                    key = %key,
                    tenant_id = %tenant_id,
                    slug = %slug,
                    plan = %plan,
                    "Provisioned tenant"
                );
                Ok(tenant_id)
            }
            None => {
                // A concurrent delivery inserted the claim first. Their
                // tenant wins; ours is compensated away.
                tracing::warn!(
                    key = %key,
                    tenant_id = %tenant_id,
                    "Lost provisioning race, compensating duplicate tenant"
                );
                self.compensate_tenant(tenant_id).await;
                self.find_claim(key).await?.ok_or_else(|| {
                    PaymentError::Internal(format!(
                        "claim row for {key} vanished after insert conflict"
                    ))
                })
            }
        }
    }

    /// Look up the tenant already provisioned for this key, if any
    pub async fn find_claim(&self, key: &IdempotencyKey) -> PaymentResult<Option<Uuid>> {
        let sql = format!(
            "SELECT tenant_id FROM {} WHERE {} = $1",
            key.claim_table(),
            key.key_column()
        );
        let row: Option<(Uuid,)> = sqlx::query_as(&sql)
            .bind(key.value())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(tenant_id,)| tenant_id))
    }

    async fn allocate_slug(&self, key: &IdempotencyKey) -> PaymentResult<String> {
        let base = slug_base(key.value());
        for candidate in slug_candidates(&base) {
            let taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM tenants WHERE slug = $1")
                .bind(&candidate)
                .fetch_optional(&self.pool)
                .await?;
            if taken.is_none() {
                return Ok(candidate);
            }
        }
        tracing::error!(base = %base, "Slug space exhausted");
        Err(PaymentError::SlugExhausted(SLUG_SUFFIX_ATTEMPTS))
    }

    async fn insert_tenant(
        &self,
        slug: &str,
        name: &str,
        plan: SubscriptionPlan,
    ) -> PaymentResult<Uuid> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO tenants
                (slug, name, business_type, deployment_type, status, subscription_plan, onboarding_status)
            VALUES ($1, $2, 'general', 'hosted', 'active', $3, 'pending')
            RETURNING id
            "#,
        )
        .bind(slug)
        .bind(name)
        .bind(plan.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn insert_subscription(
        &self,
        tenant_id: Uuid,
        plan: SubscriptionPlan,
    ) -> PaymentResult<()> {
        let trial_ends_at = if plan.expires_by_trial() {
            Some(OffsetDateTime::now_utc() + Duration::days(FREE_TRIAL_DAYS))
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO tenant_subscriptions (tenant_id, plan, status, trial_ends_at)
            VALUES ($1, $2, 'active', $3)
            "#,
        )
        .bind(tenant_id)
        .bind(plan.to_string())
        .bind(trial_ends_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_deployment_config(&self, tenant_id: Uuid) -> PaymentResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deployment_configs (tenant_id, deployment_type)
            VALUES ($1, 'hosted')
            "#,
        )
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert the claim row. Returns None when the unique key conflicted,
    /// meaning another delivery already holds this idempotency key.
    async fn insert_claim(
        &self,
        key: &IdempotencyKey,
        tenant_id: Uuid,
        customer_email: &str,
        plan: SubscriptionPlan,
    ) -> PaymentResult<Option<Uuid>> {
        let sql = format!(
            r#"
            INSERT INTO {table} ({column}, tenant_id, customer_email, plan_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ({column}) DO NOTHING
            RETURNING id
            "#,
            table = key.claim_table(),
            column = key.key_column(),
        );
        let row: Option<(Uuid,)> = sqlx::query_as(&sql)
            .bind(key.value())
            .bind(tenant_id)
            .bind(customer_email)
            .bind(plan.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Best-effort rollback: delete the tenant and let the schema cascade
    /// to subscription and deployment config. A failed rollback is logged,
    /// never propagated over the original error.
    async fn compensate_tenant(&self, tenant_id: Uuid) {
        match sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await
        {
            Ok(_) => {
                tracing::info!(tenant_id = %tenant_id, "Compensated tenant");
            }
            Err(e) => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    error = %e,
                    "Tenant compensation failed, row left behind"
                );
            }
        }
    }
}

/// Deterministic slug base: `biz-` plus the sanitized key prefix
fn slug_base(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(8)
        .collect();
    format!("biz-{sanitized}")
}

/// The base slug, then `-0` through `-9`
fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((0..SLUG_SUFFIX_ATTEMPTS).map(move |i| format!("{base}-{i}")))
}

/// Business display name from the payer's email local-part
fn derive_display_name(email: Option<&str>) -> String {
    match email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
    {
        Some(local) => format!("{local}'s Business"),
        None => "New Business".to_string(),
    }
}
