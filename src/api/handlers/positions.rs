use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::ApiResponse;
use crate::db::lot_repo;
use crate::models::{ClosedLot, OpenPosition};
use crate::AppState;

#[derive(Deserialize)]
pub struct PositionQuery {
    pub wallet_id: Option<Uuid>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PositionQuery>,
) -> Json<ApiResponse<Vec<OpenPosition>>> {
    match lot_repo::get_open_positions(&state.db, query.wallet_id).await {
        Ok(positions) => Json(ApiResponse::ok(positions)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}

#[derive(Deserialize)]
pub struct LotQuery {
    pub wallet_id: Uuid,
    pub token_id: Option<Uuid>,
}

pub async fn lots(
    State(state): State<AppState>,
    Query(query): Query<LotQuery>,
) -> Json<ApiResponse<Vec<ClosedLot>>> {
    match lot_repo::get_closed_lots(&state.db, query.wallet_id, query.token_id).await {
        Ok(lots) => Json(ApiResponse::ok(lots)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}
