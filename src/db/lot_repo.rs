use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ClosedLot, NewClosedLot, NewOpenPosition, OpenPosition};

/// Replace a wallet's derived lots and positions in one transaction.
///
/// All-or-nothing: a crash mid-write must never leave a wallet with a mix of
/// old and new lots. With `token_id = None` the whole wallet is replaced;
/// with `Some`, only that token's rows.
pub async fn replace_for_wallet(
    pool: &PgPool,
    wallet_id: Uuid,
    token_id: Option<Uuid>,
    lots: &[NewClosedLot],
    positions: &[NewOpenPosition],
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM closed_lots WHERE wallet_id = $1 AND ($2::uuid IS NULL OR token_id = $2)",
    )
    .bind(wallet_id)
    .bind(token_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM open_positions WHERE wallet_id = $1 AND ($2::uuid IS NULL OR token_id = $2)",
    )
    .bind(wallet_id)
    .bind(token_id)
    .execute(&mut *tx)
    .await?;

    for lot in lots {
        sqlx::query(
            r#"
            INSERT INTO closed_lots
                (wallet_id, token_id, entry_time, exit_time, size,
                 entry_price, exit_price, cost_basis, proceeds,
                 realized_pnl, realized_pnl_percent, cost_known)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(wallet_id)
        .bind(lot.token_id)
        .bind(lot.entry_time)
        .bind(lot.exit_time)
        .bind(lot.size)
        .bind(lot.entry_price)
        .bind(lot.exit_price)
        .bind(lot.cost_basis)
        .bind(lot.proceeds)
        .bind(lot.realized_pnl)
        .bind(lot.realized_pnl_percent)
        .bind(lot.cost_known)
        .execute(&mut *tx)
        .await?;
    }

    for pos in positions {
        sqlx::query(
            r#"
            INSERT INTO open_positions
                (wallet_id, token_id, size, avg_entry_price, first_entry_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(wallet_id)
        .bind(pos.token_id)
        .bind(pos.size)
        .bind(pos.avg_entry_price)
        .bind(pos.first_entry_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Closed lots for a wallet, newest exit first.
pub async fn get_closed_lots(
    pool: &PgPool,
    wallet_id: Uuid,
    token_id: Option<Uuid>,
) -> anyhow::Result<Vec<ClosedLot>> {
    let lots = sqlx::query_as::<_, ClosedLot>(
        r#"
        SELECT * FROM closed_lots
        WHERE wallet_id = $1 AND ($2::uuid IS NULL OR token_id = $2)
        ORDER BY exit_time DESC
        "#,
    )
    .bind(wallet_id)
    .bind(token_id)
    .fetch_all(pool)
    .await?;

    Ok(lots)
}

/// Open positions, optionally scoped to one wallet.
pub async fn get_open_positions(
    pool: &PgPool,
    wallet_id: Option<Uuid>,
) -> anyhow::Result<Vec<OpenPosition>> {
    let positions = sqlx::query_as::<_, OpenPosition>(
        r#"
        SELECT * FROM open_positions
        WHERE ($1::uuid IS NULL OR wallet_id = $1)
        ORDER BY first_entry_at DESC
        "#,
    )
    .bind(wallet_id)
    .fetch_all(pool)
    .await?;

    Ok(positions)
}
