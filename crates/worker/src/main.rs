//! BizOS background worker.
//!
//! Runs the expired-trial sweep on a cron schedule. The same sweep is also
//! callable through the API's service-role endpoint for manual runs; both
//! paths go through the same service, so overlapping runs are harmless.

use std::sync::Arc;

use anyhow::Context;
use bizos_payments::TrialService;
use bizos_shared::{db, trial::GracePolicy};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default: once a day at 03:00 UTC, off-peak for every supported region.
const DEFAULT_SWEEP_SCHEDULE: &str = "0 0 3 * * *";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = db::create_pool(&database_url)
        .await
        .context("failed to connect to database")?;

    let schedule = std::env::var("TRIAL_SWEEP_SCHEDULE")
        .unwrap_or_else(|_| DEFAULT_SWEEP_SCHEDULE.to_string());
    let trials = Arc::new(TrialService::new(pool, GracePolicy::from_env()));

    let scheduler = JobScheduler::new()
        .await
        .context("failed to create job scheduler")?;

    let job_trials = Arc::clone(&trials);
    let sweep_job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let trials = Arc::clone(&job_trials);
        Box::pin(async move {
            run_sweep(&trials).await;
        })
    })
    .with_context(|| format!("invalid TRIAL_SWEEP_SCHEDULE: {schedule}"))?;

    scheduler
        .add(sweep_job)
        .await
        .context("failed to schedule trial sweep")?;
    scheduler
        .start()
        .await
        .context("failed to start scheduler")?;

    tracing::info!(%schedule, "BizOS worker started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down worker");
    Ok(())
}

async fn run_sweep(trials: &TrialService) {
    match trials.sweep_expired().await {
        Ok(outcome) if outcome.removed() > 0 => {
            tracing::info!(
                removed = outcome.removed(),
                tenant_ids = ?outcome.tenant_ids,
                "expired trial sweep removed tenants"
            );
        }
        Ok(_) => {
            tracing::debug!("expired trial sweep found nothing to remove");
        }
        Err(err) => {
            // Next scheduled run retries; sweeps are idempotent.
            tracing::error!(error = %err, "expired trial sweep failed");
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bizos_worker=info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
