use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Token registry row, upserted on first sight of a mint.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Token {
    pub id: Uuid,
    pub mint: String,
    pub symbol: Option<String>,
    pub decimals: Option<i32>,
    pub created_at: Option<DateTime<Utc>>,
}
