use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{JobType, QueueJob};

/// Enqueue a recomputation job for a wallet. A pending job for the same
/// wallet+type already in the queue makes this a no-op (partial unique
/// index), so burst enqueues collapse into one run.
pub async fn enqueue(
    pool: &PgPool,
    wallet_id: Uuid,
    job_type: JobType,
    priority: i32,
) -> anyhow::Result<Option<QueueJob>> {
    let job = sqlx::query_as::<_, QueueJob>(
        r#"
        INSERT INTO queue_jobs (wallet_id, job_type, priority)
        VALUES ($1, $2, $3)
        ON CONFLICT (wallet_id, job_type) WHERE status = 'pending' DO NOTHING
        RETURNING *
        "#,
    )
    .bind(wallet_id)
    .bind(job_type)
    .bind(priority)
    .fetch_optional(pool)
    .await?;

    Ok(job)
}

/// Claim the next runnable job, or `None` when the queue is drained.
///
/// Compare-and-swap: select the best candidate, then flip it to
/// `processing` conditioned on it still being `pending`. Zero rows affected
/// means another worker won the race; reselect. This is the system's only
/// mutual-exclusion primitive — at most one worker owns a job at a time.
pub async fn claim_next_job(pool: &PgPool) -> anyhow::Result<Option<QueueJob>> {
    loop {
        let candidate: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM queue_jobs
            WHERE status = 'pending' AND next_run_at <= NOW()
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(pool)
        .await?;

        let Some((id,)) = candidate else {
            return Ok(None);
        };

        let claimed = sqlx::query_as::<_, QueueJob>(
            r#"
            UPDATE queue_jobs
            SET status = 'processing',
                attempts = attempts + 1,
                last_attempt_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match claimed {
            Some(job) => return Ok(Some(job)),
            // Lost the race — another worker claimed it first.
            None => continue,
        }
    }
}

/// Remove a completed job from the queue.
pub async fn mark_completed(pool: &PgPool, job_id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Return a failed job to the queue with a retry delay. The wallet serves
/// stale derived data until the retry succeeds.
pub async fn mark_failed(
    pool: &PgPool,
    job_id: Uuid,
    error: &str,
    retry_delay: Duration,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE queue_jobs
        SET status = 'pending',
            last_error = $2,
            next_run_at = $3
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(error)
    .bind(Utc::now() + retry_delay)
    .execute(pool)
    .await?;

    Ok(())
}

/// Pending-job depth, for the health/metrics surface.
pub async fn count_pending(pool: &PgPool) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM queue_jobs WHERE status = 'pending'",
    )
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}
