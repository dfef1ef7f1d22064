use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{BaseToken, Side, StagedStatus};

/// Database row for staged_trades: a normalized, unpriced swap event
/// awaiting valuation. Identity is `(tx_signature, wallet_id, side)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StagedTrade {
    pub id: Uuid,
    pub tx_signature: String,
    pub wallet_id: Uuid,
    pub token_id: Uuid,
    pub side: Side,
    pub amount_token: Decimal,
    /// Net base-currency amount, in the swap's own base currency. Never
    /// USD-denominated.
    pub amount_base_raw: Decimal,
    pub base_token: BaseToken,
    pub price_base_per_token_raw: Option<Decimal>,
    pub traded_at: DateTime<Utc>,
    pub dex: Option<String>,
    pub status: StagedStatus,
    pub last_error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Staging record produced by the normalizer, before it has an id.
#[derive(Debug, Clone)]
pub struct NewStagedTrade {
    pub tx_signature: String,
    pub wallet_id: Uuid,
    pub token_id: Uuid,
    pub side: Side,
    pub amount_token: Decimal,
    pub amount_base_raw: Decimal,
    pub base_token: BaseToken,
    pub price_base_per_token_raw: Option<Decimal>,
    pub traded_at: DateTime<Utc>,
    pub dex: Option<String>,
}
