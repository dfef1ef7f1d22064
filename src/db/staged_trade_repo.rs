use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewStagedTrade, StagedStatus, StagedTrade};

/// Insert a staged trade. Duplicate delivery of the same
/// `(tx_signature, wallet_id, side)` is a silent no-op: the unique
/// constraint absorbs it and `Ok(None)` is returned.
pub async fn insert_staged(
    pool: &PgPool,
    new: &NewStagedTrade,
) -> anyhow::Result<Option<StagedTrade>> {
    let staged = sqlx::query_as::<_, StagedTrade>(
        r#"
        INSERT INTO staged_trades
            (tx_signature, wallet_id, token_id, side, amount_token,
             amount_base_raw, base_token, price_base_per_token_raw,
             traded_at, dex)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (tx_signature, wallet_id, side) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&new.tx_signature)
    .bind(new.wallet_id)
    .bind(new.token_id)
    .bind(new.side)
    .bind(new.amount_token)
    .bind(new.amount_base_raw)
    .bind(new.base_token)
    .bind(new.price_base_per_token_raw)
    .bind(new.traded_at)
    .bind(&new.dex)
    .fetch_optional(pool)
    .await?;

    Ok(staged)
}

/// Fetch staged trades eligible for processing, oldest first. Failed rows
/// stay eligible: valuation failures are transient by policy.
pub async fn get_processable(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<StagedTrade>> {
    let staged = sqlx::query_as::<_, StagedTrade>(
        r#"
        SELECT * FROM staged_trades
        WHERE status IN ('pending', 'failed')
        ORDER BY traded_at ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(staged)
}

/// Mark a staged trade processed.
pub async fn mark_processed(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE staged_trades
        SET status = 'processed', last_error = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a staged trade failed with the error message. The row remains
/// eligible for the next poll.
pub async fn mark_failed(pool: &PgPool, id: Uuid, error: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE staged_trades
        SET status = 'failed', last_error = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Count staged trades by status, for the health/metrics surface.
pub async fn count_by_status(pool: &PgPool, status: StagedStatus) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM staged_trades WHERE status = $1",
    )
    .bind(status)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}
