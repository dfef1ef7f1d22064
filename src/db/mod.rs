pub mod lot_repo;
pub mod queue_repo;
pub mod signal_repo;
pub mod staged_trade_repo;
pub mod token_repo;
pub mod trade_repo;
pub mod wallet_repo;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}
