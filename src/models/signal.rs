use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{SignalStatus, Side};

/// A consensus alert: ≥2 distinct tracked wallets bought the same token
/// within a chained time window. One row per (token, cluster start).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Signal {
    pub id: Uuid,
    pub signal_type: Side,
    /// The wallet whose buy triggered detection.
    pub wallet_id: Uuid,
    pub token_id: Uuid,
    pub original_trade_id: Option<Uuid>,
    pub model: String,
    /// `{"wallet_count": N, "wallets": [...]}` — extended in place when a
    /// late-arriving buy joins the cluster.
    pub meta: serde_json::Value,
    pub cluster_start: DateTime<Utc>,
    pub cluster_end: DateTime<Utc>,
    pub status: SignalStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn wallet_count(&self) -> i64 {
        self.meta
            .get("wallet_count")
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }
}
