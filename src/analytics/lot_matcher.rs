use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use crate::db::{lot_repo, trade_repo};
use crate::models::{NewClosedLot, NewOpenPosition, Side, Trade};

/// An unmatched buy awaiting sells, in arrival order.
#[derive(Debug, Clone)]
struct OpenLot {
    size: Decimal,
    price: Decimal,
    entry_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecomputeSummary {
    pub closed_lots: usize,
    pub open_positions: usize,
}

/// FIFO-match a wallet's trade history into closed lots and open positions.
///
/// Input must be sorted by timestamp ascending; the engine always works from
/// the complete history, never patching existing lots incrementally, so
/// late-arriving trades are handled by recomputation. Strict earliest-buy
/// first pairing — not average cost — is the accounting policy the win-rate
/// analytics depend on.
pub fn match_lots(trades: &[Trade]) -> (Vec<NewClosedLot>, Vec<NewOpenPosition>) {
    let mut by_token: BTreeMap<Uuid, Vec<&Trade>> = BTreeMap::new();
    for trade in trades {
        by_token.entry(trade.token_id).or_default().push(trade);
    }

    let mut lots = Vec::new();
    let mut positions = Vec::new();

    for (token_id, token_trades) in by_token {
        match_token(token_id, &token_trades, &mut lots, &mut positions);
    }

    (lots, positions)
}

fn match_token(
    token_id: Uuid,
    trades: &[&Trade],
    lots: &mut Vec<NewClosedLot>,
    positions: &mut Vec<NewOpenPosition>,
) {
    let mut fifo: VecDeque<OpenLot> = VecDeque::new();

    // Best-effort cost estimate for sells that predate the known history.
    let earliest_price = trades
        .iter()
        .map(|t| t.effective_price())
        .find(|p| !p.is_zero());
    let earliest_time = trades.first().map(|t| t.traded_at);

    for trade in trades {
        match trade.side {
            Side::Buy => {
                fifo.push_back(OpenLot {
                    size: trade.amount_token,
                    price: trade.effective_price(),
                    entry_time: trade.traded_at,
                });
            }
            Side::Sell => {
                let exit_price = trade.effective_price();
                let mut remaining = trade.amount_token;

                while remaining > Decimal::ZERO {
                    let Some(front) = fifo.front_mut() else { break };

                    // A sell may span several buy lots; each spanned portion
                    // becomes its own closed lot with its own entry price.
                    let matched = front.size.min(remaining);
                    lots.push(close_lot(
                        token_id,
                        matched,
                        front.price,
                        exit_price,
                        front.entry_time,
                        trade.traded_at,
                        true,
                    ));

                    front.size -= matched;
                    remaining -= matched;
                    if front.size.is_zero() {
                        fifo.pop_front();
                    }
                }

                // History starts after the wallet's real first entry: cost
                // the overflow at the earliest known price rather than
                // fabricating a buy lot, and flag it.
                if remaining > Decimal::ZERO {
                    let est_price = earliest_price.unwrap_or(exit_price);
                    lots.push(close_lot(
                        token_id,
                        remaining,
                        est_price,
                        exit_price,
                        earliest_time.unwrap_or(trade.traded_at),
                        trade.traded_at,
                        false,
                    ));
                }
            }
            // No base exposure: voids sit outside cost-basis accounting.
            Side::Void => {}
        }
    }

    if !fifo.is_empty() {
        let total: Decimal = fifo.iter().map(|l| l.size).sum();
        if total > Decimal::ZERO {
            let weighted: Decimal = fifo.iter().map(|l| l.size * l.price).sum::<Decimal>() / total;
            positions.push(NewOpenPosition {
                token_id,
                size: total,
                avg_entry_price: weighted,
                first_entry_at: fifo
                    .front()
                    .map(|l| l.entry_time)
                    .unwrap_or_else(Utc::now),
            });
        }
    }
}

fn close_lot(
    token_id: Uuid,
    size: Decimal,
    entry_price: Decimal,
    exit_price: Decimal,
    entry_time: DateTime<Utc>,
    exit_time: DateTime<Utc>,
    cost_known: bool,
) -> NewClosedLot {
    let cost_basis = size * entry_price;
    let proceeds = size * exit_price;
    let realized_pnl = proceeds - cost_basis;
    let realized_pnl_percent = if cost_basis.is_zero() {
        None
    } else {
        Some(realized_pnl / cost_basis * Decimal::ONE_HUNDRED)
    };

    NewClosedLot {
        token_id,
        entry_time,
        exit_time,
        size,
        entry_price,
        exit_price,
        cost_basis,
        proceeds,
        realized_pnl,
        realized_pnl_percent,
        cost_known,
    }
}

/// Recompute and persist a wallet's derived PnL views.
///
/// The replace is transactional per wallet: a crash mid-write never leaves a
/// mix of old and new lots. Trades before `tracking_start` are excluded.
pub async fn process_trades_for_wallet(
    pool: &PgPool,
    wallet_id: Uuid,
    token_filter: Option<Uuid>,
    tracking_start: Option<DateTime<Utc>>,
) -> anyhow::Result<RecomputeSummary> {
    let trades =
        trade_repo::get_trades_for_matching(pool, wallet_id, token_filter, tracking_start).await?;

    let (lots, positions) = match_lots(&trades);
    let summary = RecomputeSummary {
        closed_lots: lots.len(),
        open_positions: positions.len(),
    };

    lot_repo::replace_for_wallet(pool, wallet_id, token_filter, &lots, &positions).await?;

    tracing::debug!(
        wallet_id = %wallet_id,
        closed_lots = summary.closed_lots,
        open_positions = summary.open_positions,
        "Wallet PnL recomputed"
    );

    Ok(summary)
}
