use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResponse;
use crate::db::trade_repo;
use crate::models::{BaseToken, Side, Trade};
use crate::AppState;

#[derive(Deserialize)]
pub struct TradeListQuery {
    pub wallet_id: Option<Uuid>,
    pub side: Option<Side>,
    pub base_token: Option<BaseToken>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<TradeListQuery>,
) -> Json<ApiResponse<Vec<Trade>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    match trade_repo::list_trades(
        &state.db,
        query.wallet_id,
        query.side,
        query.base_token,
        query.since,
        query.until,
        limit,
        offset,
    )
    .await
    {
        Ok(trades) => Json(ApiResponse::ok(trades)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
