use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A curated smart wallet whose swaps are tracked.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub address: String,
    pub label: Option<String>,
    pub is_active: Option<bool>,
    /// Trades before this instant predate tracking; sells matched against
    /// them are flagged `cost_known = false`.
    pub tracking_started_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}
