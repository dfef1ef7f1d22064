use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::db::signal_repo;
use crate::models::{Signal, SignalStatus};
use crate::AppState;

#[derive(Deserialize)]
pub struct SignalListQuery {
    pub status: Option<SignalStatus>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<SignalListQuery>,
) -> Json<ApiResponse<Vec<Signal>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200);

    match signal_repo::list_signals(&state.db, query.status, limit).await {
        Ok(signals) => Json(ApiResponse::ok(signals)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
