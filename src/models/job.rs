use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{JobStatus, JobType};

/// Per-wallet recomputation job. Claimed by exactly one worker at a time via
/// a conditional update on `status`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueJob {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: i32,
    pub next_run_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
