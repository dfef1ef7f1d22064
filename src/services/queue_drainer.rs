use metrics::counter;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::analytics::lot_matcher;
use crate::db::{queue_repo, wallet_repo};
use crate::models::{JobType, QueueJob};

/// Claim and run recomputation jobs until the queue is empty, then sleep.
///
/// Different wallets' jobs run freely in parallel across drainer instances;
/// the claim's conditional update guarantees a single owner per job.
pub async fn run_queue_drainer(pool: PgPool, poll_interval: Duration, retry_delay: chrono::Duration) {
    tracing::info!(
        poll_secs = poll_interval.as_secs(),
        "Queue drainer started"
    );

    let mut ticker = interval(poll_interval);

    loop {
        ticker.tick().await;

        loop {
            match queue_repo::claim_next_job(&pool).await {
                Ok(Some(job)) => run_job(&pool, &job, retry_delay).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Queue claim failed");
                    break;
                }
            }
        }
    }
}

async fn run_job(pool: &PgPool, job: &QueueJob, retry_delay: chrono::Duration) {
    tracing::debug!(
        job_id = %job.id,
        wallet_id = %job.wallet_id,
        job_type = %job.job_type,
        attempt = job.attempts,
        "Running queue job"
    );

    let result = match job.job_type {
        JobType::LotMatching | JobType::Backfill => {
            let tracking_start = wallet_repo::get_wallet(pool, job.wallet_id)
                .await
                .ok()
                .flatten()
                .and_then(|w| w.tracking_started_at);

            lot_matcher::process_trades_for_wallet(pool, job.wallet_id, None, tracking_start).await
        }
    };

    match result {
        Ok(summary) => {
            if let Err(e) = queue_repo::mark_completed(pool, job.id).await {
                tracing::error!(error = %e, job_id = %job.id, "Failed to mark job completed");
                return;
            }
            counter!("queue_jobs_completed_total").increment(1);
            tracing::info!(
                job_id = %job.id,
                wallet_id = %job.wallet_id,
                closed_lots = summary.closed_lots,
                open_positions = summary.open_positions,
                "Queue job completed"
            );
        }
        Err(e) => {
            // The wallet serves stale derived data until the retry lands;
            // ingestion is never blocked by a stuck recomputation.
            counter!("queue_jobs_failed_total").increment(1);
            tracing::error!(
                error = %e,
                job_id = %job.id,
                wallet_id = %job.wallet_id,
                "Queue job failed, scheduling retry"
            );
            if let Err(e) = queue_repo::mark_failed(pool, job.id, &e.to_string(), retry_delay).await
            {
                tracing::error!(error = %e, job_id = %job.id, "Failed to mark job failed");
            }
        }
    }
}
