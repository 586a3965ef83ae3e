//! Payment webhook processing
//!
//! Translates verified provider events into provisioning calls. Every event
//! is recorded in the `webhook_events` ledger, claimed atomically with
//! `INSERT .. ON CONFLICT .. DO UPDATE .. WHERE` so only one delivery of an
//! event processes at a time. Events stuck in `processing` longer than the
//! timeout are reclaimable so a crashed handler cannot wedge an event
//! forever.

use bizos_shared::{PaymentProvider, ProcessingResult, SubscriptionPlan};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};
use crate::paypal::PayPalWebhookEvent;
use crate::provisioning::{IdempotencyKey, ProvisioningService};
use crate::stripe::{StripeCheckoutSession, StripeEvent};

const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Fields pulled out of a PayPal capture resource
#[derive(Debug, Clone)]
struct CaptureDetails {
    capture_id: String,
    amount_minor: i64,
    payer_email: Option<String>,
}

/// Turns verified webhook events into tenants
#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    provisioning: ProvisioningService,
}

impl WebhookService {
    pub fn new(pool: PgPool) -> Self {
        let provisioning = ProvisioningService::new(pool.clone());
        Self { pool, provisioning }
    }

    /// Process a verified Stripe event. Returns the provisioned tenant id
    /// when the event completed a checkout, None for duplicates and ignored
    /// event types.
    pub async fn process_stripe_event(&self, event: &StripeEvent) -> PaymentResult<Option<Uuid>> {
        if !self
            .claim_event(PaymentProvider::Stripe, &event.id, &event.event_type)
            .await?
        {
            return Ok(None);
        }

        let result = self.handle_stripe_event(event).await;
        self.finish_event(PaymentProvider::Stripe, &event.id, &result)
            .await;
        result
    }

    /// Process a PayPal event. Only `PAYMENT.CAPTURE.COMPLETED` provisions;
    /// everything else is acknowledged without touching the ledger.
    pub async fn process_paypal_event(
        &self,
        event: &PayPalWebhookEvent,
    ) -> PaymentResult<Option<Uuid>> {
        if event.event_type != "PAYMENT.CAPTURE.COMPLETED" {
            tracing::info!(
                event_type = %event.event_type,
                "Ignoring unhandled PayPal event type"
            );
            return Ok(None);
        }

        let capture = parse_capture_resource(&event.resource)?;
        // Some PayPal deliveries omit the envelope id; the capture id is
        // just as unique for dedup purposes.
        let event_id = event
            .id
            .clone()
            .unwrap_or_else(|| format!("capture-{}", capture.capture_id));

        if !self
            .claim_event(PaymentProvider::Paypal, &event_id, &event.event_type)
            .await?
        {
            return Ok(None);
        }

        let result = self.handle_paypal_capture(&capture).await;
        self.finish_event(PaymentProvider::Paypal, &event_id, &result)
            .await;
        result
    }

    async fn handle_stripe_event(&self, event: &StripeEvent) -> PaymentResult<Option<Uuid>> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session: StripeCheckoutSession =
                    serde_json::from_value(event.data.object.clone()).map_err(|e| {
                        PaymentError::InvalidInput(format!("malformed checkout session: {e}"))
                    })?;

                let plan = stripe_session_plan(&session);
                let key = IdempotencyKey::StripeSession(session.id.clone());
                let tenant_id = self
                    .provisioning
                    .provision(&key, session.email(), plan)
                    .await?;
                Ok(Some(tenant_id))
            }
            other => {
                tracing::info!(event_type = %other, "Ignoring unhandled Stripe event type");
                Ok(None)
            }
        }
    }

    async fn handle_paypal_capture(
        &self,
        capture: &CaptureDetails,
    ) -> PaymentResult<Option<Uuid>> {
        let plan = SubscriptionPlan::infer_from_minor_units(capture.amount_minor);
        let key = IdempotencyKey::PaypalCapture(capture.capture_id.clone());
        let tenant_id = self
            .provisioning
            .provision(&key, capture.payer_email.as_deref(), plan)
            .await?;
        Ok(Some(tenant_id))
    }

    /// Atomically claim exclusive processing rights for an event.
    ///
    /// The insert either creates the ledger row in `processing` state or,
    /// via the conditional conflict update, re-claims a row stuck in
    /// `processing` past the timeout or one that last finished `failed`.
    /// Failed rows stay claimable so the provider's redelivery retries the
    /// work; `success` and `skipped` are terminal. No returned row means
    /// another delivery holds or already finished this event.
    async fn claim_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        event_type: &str,
    ) -> PaymentResult<bool> {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO webhook_events
                (provider, event_id, event_type, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (provider, event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                error_message = CONCAT('Reclaimed from ', webhook_events.processing_result,
                                       ' at ', NOW()::TEXT)
            WHERE (webhook_events.processing_result = 'processing'
                   AND webhook_events.processing_started_at < NOW() - ($4 || ' minutes')::INTERVAL)
               OR webhook_events.processing_result = 'failed'
            RETURNING id
            "#,
        )
        .bind(provider.to_string())
        .bind(event_id)
        .bind(event_type)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to claim webhook event for processing"
            );
            PaymentError::Database(e.to_string())
        })?;

        if claimed.is_none() {
            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT processing_result FROM webhook_events WHERE provider = $1 AND event_id = $2",
            )
            .bind(provider.to_string())
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten();

            let reason = match existing {
                Some((status,)) if status == "success" => "already processed successfully",
                Some((status,)) if status == "processing" => {
                    "currently being processed by another delivery"
                }
                Some(_) => "exists with another status",
                None => "unknown",
            };

            tracing::info!(
                provider = %provider,
                event_id = %event_id,
                reason = %reason,
                "Duplicate webhook event"
            );
            return Ok(false);
        }

        tracing::info!(
            provider = %provider,
            event_id = %event_id,
            event_type = %event_type,
            "Claimed webhook event for processing"
        );
        Ok(true)
    }

    /// Record the processing outcome, retrying once. The ledger row is what
    /// keeps duplicates out, so losing the update matters.
    async fn finish_event(
        &self,
        provider: PaymentProvider,
        event_id: &str,
        result: &PaymentResult<Option<Uuid>>,
    ) {
        let (outcome, tenant_id, error_message) = match result {
            Ok(Some(tenant_id)) => (ProcessingResult::Success, Some(*tenant_id), None),
            Ok(None) => (ProcessingResult::Skipped, None, None),
            Err(e) => (ProcessingResult::Failed, None, Some(e.to_string())),
        };

        const UPDATE_SQL: &str = r#"
            UPDATE webhook_events
            SET processing_result = $1, tenant_id = $2, error_message = $3, processed_at = NOW()
            WHERE provider = $4 AND event_id = $5
        "#;

        let update = sqlx::query(UPDATE_SQL)
            .bind(outcome.to_string())
            .bind(tenant_id)
            .bind(&error_message)
            .bind(provider.to_string())
            .bind(event_id)
            .execute(&self.pool)
            .await;

        if let Err(e) = update {
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "First attempt to record webhook outcome failed, retrying"
            );

            if let Err(retry_err) = sqlx::query(UPDATE_SQL)
                .bind(outcome.to_string())
                .bind(tenant_id)
                .bind(&error_message)
                .bind(provider.to_string())
                .bind(event_id)
                .execute(&self.pool)
                .await
            {
                tracing::error!(
                    provider = %provider,
                    event_id = %event_id,
                    outcome = %outcome,
                    first_error = %e,
                    retry_error = %retry_err,
                    "Failed to record webhook outcome after retry, event may appear stuck in processing"
                );
            }
        }
    }
}

/// Plan for a completed checkout: explicit metadata wins, otherwise infer
/// from the amount paid.
fn stripe_session_plan(session: &StripeCheckoutSession) -> SubscriptionPlan {
    session
        .metadata
        .get("plan_type")
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| {
            SubscriptionPlan::infer_from_minor_units(session.amount_total.unwrap_or(0))
        })
}

fn parse_capture_resource(resource: &serde_json::Value) -> PaymentResult<CaptureDetails> {
    let capture_id = resource
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            PaymentError::InvalidInput("capture event missing resource id".to_string())
        })?
        .to_string();

    let amount_minor = resource
        .pointer("/amount/value")
        .and_then(|v| v.as_str())
        .map(amount_str_to_minor_units)
        .transpose()?
        .unwrap_or(0);

    let payer_email = resource
        .pointer("/payer/email_address")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(CaptureDetails {
        capture_id,
        amount_minor,
        payer_email,
    })
}

/// Convert a provider's decimal major-unit string ("45.00") to minor units
fn amount_str_to_minor_units(value: &str) -> PaymentResult<i64> {
    let invalid = || PaymentError::InvalidInput(format!("invalid amount '{value}'"));

    let trimmed = value.trim();
    let (major_str, minor_str) = match trimmed.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (trimmed, ""),
    };

    let major: i64 = major_str.parse().map_err(|_| invalid())?;
    if major < 0 {
        return Err(invalid());
    }

    let minor: i64 = match minor_str.len() {
        0 => 0,
        1 => minor_str.parse::<i64>().map_err(|_| invalid())? * 10,
        2 => minor_str.parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if minor < 0 {
        return Err(invalid());
    }

    // The string comes straight off an unauthenticated webhook body, so
    // even absurd magnitudes must fail cleanly rather than overflow.
    major
        .checked_mul(100)
        .and_then(|cents| cents.checked_add(minor))
        .ok_or_else(invalid)
}
