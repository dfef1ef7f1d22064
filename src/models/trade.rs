use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{BaseToken, Side};

/// Database row for trades: a priced, immutable ledger entry. Corrections
/// happen by deleting and reprocessing the staged row, never by mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: Uuid,
    pub staged_trade_id: Option<Uuid>,
    pub tx_signature: String,
    pub wallet_id: Uuid,
    pub token_id: Uuid,
    pub side: Side,
    pub amount_token: Decimal,
    /// Base-currency amount in the swap's native currency, never silently
    /// converted to USD.
    pub amount_base: Decimal,
    pub base_token: BaseToken,
    pub price_base_per_token: Option<Decimal>,
    pub value_usd: Option<Decimal>,
    pub price_usd_per_token: Option<Decimal>,
    /// Which price source valued this trade (provenance).
    pub valuation_source: Option<String>,
    pub traded_at: DateTime<Utc>,
    pub dex: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// Effective base-currency price per token, derived from the trade's own
    /// amounts when the stored price is missing.
    pub fn effective_price(&self) -> Decimal {
        if let Some(p) = self.price_base_per_token {
            return p;
        }
        if self.amount_token.is_zero() {
            Decimal::ZERO
        } else {
            self.amount_base / self.amount_token
        }
    }
}
