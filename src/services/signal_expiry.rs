use sqlx::PgPool;
use std::time::Duration;
use tokio::time::interval;

use crate::db::signal_repo;

/// Periodically flip active signals past their expiry to `expired`.
pub async fn run_signal_expiry(pool: PgPool, sweep_interval: Duration) {
    let mut ticker = interval(sweep_interval);

    loop {
        ticker.tick().await;

        match signal_repo::expire_stale(&pool).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(expired = n, "Signals expired"),
            Err(e) => tracing::error!(error = %e, "Signal expiry sweep failed"),
        }
    }
}
