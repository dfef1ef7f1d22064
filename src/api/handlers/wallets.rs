use axum::extract::{Path, State};
use axum::Json;

use super::ApiResponse;
use crate::db::{trade_repo, wallet_repo};
use crate::errors::AppError;
use crate::models::Wallet;
use crate::AppState;

pub async fn list(State(state): State<AppState>) -> Json<ApiResponse<Vec<Wallet>>> {
    match wallet_repo::get_active_wallets(&state.db).await {
        Ok(wallets) => Json(ApiResponse::ok(wallets)),
        Err(e) => Json(ApiResponse::err(e)),
    }
}

#[derive(serde::Deserialize)]
pub struct CreateWallet {
    pub address: String,
    pub label: Option<String>,
}

/// Add a wallet to the tracked set. Tracking starts now; earlier activity
/// shows up as `cost_known = false` lots.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateWallet>,
) -> Result<Json<ApiResponse<Wallet>>, AppError> {
    if body.address.trim().is_empty() {
        return Err(AppError::BadRequest("address must not be empty".into()));
    }

    let wallet =
        wallet_repo::upsert_wallet(&state.db, body.address.trim(), body.label.as_deref()).await?;

    Ok(Json(ApiResponse::ok(wallet)))
}

#[derive(serde::Serialize)]
pub struct WalletDetail {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub trade_count: i64,
}

pub async fn detail(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<WalletDetail>>, AppError> {
    let wallet = wallet_repo::get_wallet_by_address(&state.db, &address)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("wallet {address}")))?;

    let trade_count = trade_repo::count_trades_for_wallet(&state.db, wallet.id).await?;

    Ok(Json(ApiResponse::ok(WalletDetail {
        wallet,
        trade_count,
    })))
}
