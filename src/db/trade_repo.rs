use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{BaseToken, Side, StagedTrade, Trade};

/// Commit a priced ledger entry for a processed staged trade. The unique
/// constraint mirrors staging, so a re-run of the same staged row cannot
/// produce a second ledger entry; `Ok(None)` means it already existed.
#[allow(clippy::too_many_arguments)]
pub async fn insert_trade(
    pool: &PgPool,
    staged: &StagedTrade,
    amount_base: Decimal,
    price_base_per_token: Option<Decimal>,
    value_usd: Option<Decimal>,
    price_usd_per_token: Option<Decimal>,
    valuation_source: Option<&str>,
) -> anyhow::Result<Option<Trade>> {
    let trade = sqlx::query_as::<_, Trade>(
        r#"
        INSERT INTO trades
            (staged_trade_id, tx_signature, wallet_id, token_id, side,
             amount_token, amount_base, base_token, price_base_per_token,
             value_usd, price_usd_per_token, valuation_source, traded_at, dex)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (tx_signature, wallet_id, side) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(staged.id)
    .bind(&staged.tx_signature)
    .bind(staged.wallet_id)
    .bind(staged.token_id)
    .bind(staged.side)
    .bind(staged.amount_token)
    .bind(amount_base)
    .bind(staged.base_token)
    .bind(price_base_per_token)
    .bind(value_usd)
    .bind(price_usd_per_token)
    .bind(valuation_source)
    .bind(staged.traded_at)
    .bind(&staged.dex)
    .fetch_optional(pool)
    .await?;

    Ok(trade)
}

/// Full trade history for a wallet sorted by timestamp ascending — the
/// order the matching engine's FIFO invariant depends on.
pub async fn get_trades_for_matching(
    pool: &PgPool,
    wallet_id: Uuid,
    token_id: Option<Uuid>,
    since: Option<DateTime<Utc>>,
) -> anyhow::Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE wallet_id = $1
          AND ($2::uuid IS NULL OR token_id = $2)
          AND ($3::timestamptz IS NULL OR traded_at >= $3)
        ORDER BY traded_at ASC, created_at ASC
        "#,
    )
    .bind(wallet_id)
    .bind(token_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}

/// Buy trades for a token in the trailing consensus window, oldest first.
pub async fn get_token_buys_in_window(
    pool: &PgPool,
    token_id: Uuid,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> anyhow::Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE token_id = $1 AND side = 'buy'
          AND traded_at >= $2 AND traded_at <= $3
        ORDER BY traded_at ASC
        "#,
    )
    .bind(token_id)
    .bind(since)
    .bind(until)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}

/// Paged trade listing for the read API.
#[allow(clippy::too_many_arguments)]
pub async fn list_trades(
    pool: &PgPool,
    wallet_id: Option<Uuid>,
    side: Option<Side>,
    base_token: Option<BaseToken>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE ($1::uuid IS NULL OR wallet_id = $1)
          AND ($2::text IS NULL OR side = $2::text)
          AND ($3::text IS NULL OR base_token = $3::text)
          AND ($4::timestamptz IS NULL OR traded_at >= $4)
          AND ($5::timestamptz IS NULL OR traded_at <= $5)
        ORDER BY traded_at DESC
        LIMIT $6 OFFSET $7
        "#,
    )
    .bind(wallet_id)
    .bind(side.map(|s| s.as_str()))
    .bind(base_token.map(|b| b.as_str()))
    .bind(since)
    .bind(until)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}

pub async fn count_trades_for_wallet(pool: &PgPool, wallet_id: Uuid) -> anyhow::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM trades WHERE wallet_id = $1",
    )
    .bind(wallet_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}
