use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A fully-matched buy/sell pairing (or portion of one) with realized PnL.
/// Derived view: replaced wholesale on every recomputation for a wallet.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClosedLot {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub token_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_percent: Option<Decimal>,
    /// False when the matched buy predates tracking and the cost basis is a
    /// best-effort estimate from the earliest known price.
    pub cost_known: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Closed lot produced by the matching engine, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClosedLot {
    pub token_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_percent: Option<Decimal>,
    pub cost_known: bool,
}

/// Remaining unmatched buy size for a wallet+token, with size-weighted
/// average entry price.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OpenPosition {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub token_id: Uuid,
    pub size: Decimal,
    pub avg_entry_price: Decimal,
    pub first_entry_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewOpenPosition {
    pub token_id: Uuid,
    pub size: Decimal,
    pub avg_entry_price: Decimal,
    pub first_entry_at: DateTime<Utc>,
}
