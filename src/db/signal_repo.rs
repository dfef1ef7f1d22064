use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Signal, SignalStatus};

/// Find an active signal for this token whose cluster range overlaps the
/// given range. Late-arriving trades extend this row instead of creating a
/// duplicate.
pub async fn find_overlapping(
    pool: &PgPool,
    token_id: Uuid,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> anyhow::Result<Option<Signal>> {
    let signal = sqlx::query_as::<_, Signal>(
        r#"
        SELECT * FROM signals
        WHERE token_id = $1
          AND model = 'consensus'
          AND cluster_start <= $3 AND cluster_end >= $2
        ORDER BY cluster_start ASC
        LIMIT 1
        "#,
    )
    .bind(token_id)
    .bind(range_start)
    .bind(range_end)
    .fetch_optional(pool)
    .await?;

    Ok(signal)
}

/// Create a consensus signal for a cluster. The (token_id, cluster_start)
/// unique constraint backstops concurrent detection: a loser of the race
/// updates the winner's row instead of inserting a second one.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_signal(
    pool: &PgPool,
    wallet_id: Uuid,
    token_id: Uuid,
    original_trade_id: Uuid,
    meta: serde_json::Value,
    cluster_start: DateTime<Utc>,
    cluster_end: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<Signal> {
    let signal = sqlx::query_as::<_, Signal>(
        r#"
        INSERT INTO signals
            (signal_type, wallet_id, token_id, original_trade_id, model,
             meta, cluster_start, cluster_end, expires_at)
        VALUES ('buy', $1, $2, $3, 'consensus', $4, $5, $6, $7)
        ON CONFLICT (token_id, cluster_start) DO UPDATE
            SET meta = $4,
                cluster_end = GREATEST(signals.cluster_end, $6),
                expires_at = GREATEST(signals.expires_at, $7),
                updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(wallet_id)
    .bind(token_id)
    .bind(original_trade_id)
    .bind(meta)
    .bind(cluster_start)
    .bind(cluster_end)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(signal)
}

/// Extend an existing signal with a grown cluster.
pub async fn extend_signal(
    pool: &PgPool,
    id: Uuid,
    meta: serde_json::Value,
    cluster_end: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<Signal> {
    let signal = sqlx::query_as::<_, Signal>(
        r#"
        UPDATE signals
        SET meta = $2,
            cluster_end = GREATEST(cluster_end, $3),
            expires_at = GREATEST(expires_at, $4),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(meta)
    .bind(cluster_end)
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(signal)
}

/// Signal listing for the read API, newest first.
pub async fn list_signals(
    pool: &PgPool,
    status: Option<SignalStatus>,
    limit: i64,
) -> anyhow::Result<Vec<Signal>> {
    let signals = sqlx::query_as::<_, Signal>(
        r#"
        SELECT * FROM signals
        WHERE ($1::text IS NULL OR status = $1::text)
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(status.map(|s| match s {
        SignalStatus::Active => "active",
        SignalStatus::Executed => "executed",
        SignalStatus::Expired => "expired",
    }))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(signals)
}

/// Flip active signals past their expiry to expired. Returns how many rows
/// changed.
pub async fn expire_stale(pool: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE signals
        SET status = 'expired', updated_at = NOW()
        WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < NOW()
        "#,
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
