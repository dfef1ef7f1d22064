use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::time::interval;
use uuid::Uuid;

use crate::analytics::consensus;
use crate::db::{queue_repo, staged_trade_repo, trade_repo};
use crate::models::{JobType, Side, StagedStatus, StagedTrade, Trade};
use crate::valuation::ValuationResolver;

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    /// Per-wallet window that coalesces a burst of sells into a single
    /// recomputation enqueue.
    pub debounce_window: Duration,
    pub consensus_window: chrono::Duration,
    pub signal_ttl: chrono::Duration,
}

/// Drain staged trades forever: valuate, commit ledger entries, and kick
/// off downstream recomputation and consensus detection.
pub async fn run_ingestion_worker(
    pool: PgPool,
    resolver: Arc<ValuationResolver>,
    config: IngestionConfig,
) {
    tracing::info!(
        batch_size = config.batch_size,
        poll_secs = config.poll_interval.as_secs(),
        "Ingestion worker started"
    );

    let mut debounce: HashMap<Uuid, Instant> = HashMap::new();
    let mut ticker = interval(config.poll_interval);

    loop {
        ticker.tick().await;

        match drain_once(&pool, &resolver, &config, &mut debounce).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!(processed = n, "Ingestion cycle complete"),
            Err(e) => tracing::error!(error = %e, "Ingestion cycle failed"),
        }
    }
}

/// Process one batch of staged trades, oldest first. Failures are isolated
/// per record: one bad trade never blocks the rest of the batch.
pub async fn drain_once(
    pool: &PgPool,
    resolver: &ValuationResolver,
    config: &IngestionConfig,
    debounce: &mut HashMap<Uuid, Instant>,
) -> anyhow::Result<u32> {
    let staged = staged_trade_repo::get_processable(pool, config.batch_size).await?;
    let mut processed = 0u32;

    for record in &staged {
        let start = Instant::now();
        match process_staged(pool, resolver, config, debounce, record).await {
            Ok(true) => {
                processed += 1;
                counter!("trades_processed_total").increment(1);
                histogram!("ingest_latency_seconds").record(start.elapsed().as_secs_f64());
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    staged_id = %record.id,
                    signature = %record.tx_signature,
                    "Failed to process staged trade, continuing batch"
                );
                let _ = staged_trade_repo::mark_failed(pool, record.id, &e.to_string()).await;
            }
        }
    }

    if let Ok(backlog) = staged_trade_repo::count_by_status(pool, StagedStatus::Pending).await {
        gauge!("staged_backlog").set(backlog as f64);
    }

    Ok(processed)
}

/// Returns Ok(true) when a ledger entry was committed, Ok(false) when the
/// record was left for retry.
async fn process_staged(
    pool: &PgPool,
    resolver: &ValuationResolver,
    config: &IngestionConfig,
    debounce: &mut HashMap<Uuid, Instant>,
    staged: &StagedTrade,
) -> anyhow::Result<bool> {
    let trade = match staged.side {
        // Token-for-token: no base exposure, nothing to valuate.
        Side::Void => {
            trade_repo::insert_trade(pool, staged, staged.amount_base_raw, None, None, None, None)
                .await?
        }
        Side::Buy | Side::Sell => {
            let valuation = match resolver
                .valuate(
                    staged.base_token,
                    staged.amount_base_raw,
                    staged.amount_token,
                    staged.traded_at,
                )
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    // Transient by policy: rate limits and outages clear up.
                    // The record stays eligible for the next poll.
                    counter!("valuation_failures_total").increment(1);
                    tracing::warn!(
                        error = %e,
                        staged_id = %staged.id,
                        "Valuation unavailable, leaving staged trade for retry"
                    );
                    staged_trade_repo::mark_failed(pool, staged.id, &e.to_string()).await?;
                    return Ok(false);
                }
            };

            let price_base = staged.price_base_per_token_raw.or_else(|| {
                if staged.amount_token.is_zero() {
                    None
                } else {
                    Some(staged.amount_base_raw / staged.amount_token)
                }
            });

            trade_repo::insert_trade(
                pool,
                staged,
                staged.amount_base_raw,
                price_base,
                Some(valuation.amount_base_usd),
                valuation.price_usd_per_token,
                Some(valuation.source),
            )
            .await?
        }
    };

    staged_trade_repo::mark_processed(pool, staged.id).await?;

    // A conflict means the ledger entry already existed (reprocessing after
    // a crash between insert and mark): nothing downstream to trigger.
    let Some(trade) = trade else {
        return Ok(true);
    };

    trigger_downstream(pool, config, debounce, &trade).await;

    Ok(true)
}

async fn trigger_downstream(
    pool: &PgPool,
    config: &IngestionConfig,
    debounce: &mut HashMap<Uuid, Instant>,
    trade: &Trade,
) {
    match trade.side {
        Side::Sell => {
            if debounce_allows(debounce, trade.wallet_id, config.debounce_window) {
                if let Err(e) =
                    queue_repo::enqueue(pool, trade.wallet_id, JobType::LotMatching, 0).await
                {
                    tracing::error!(error = %e, wallet_id = %trade.wallet_id, "Failed to enqueue lot matching");
                }
            }
        }
        Side::Buy => {
            match consensus::check_consensus_after_buy(
                pool,
                trade.id,
                trade.token_id,
                trade.wallet_id,
                trade.traded_at,
                config.consensus_window,
                config.signal_ttl,
            )
            .await
            {
                Ok(Some(signal)) => {
                    tracing::info!(
                        signal_id = %signal.id,
                        token_id = %trade.token_id,
                        wallet_count = signal.wallet_count(),
                        "Consensus signal raised"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, trade_id = %trade.id, "Consensus check failed");
                }
            }
        }
        Side::Void => {}
    }
}

/// True when no enqueue happened for this wallet inside the window.
fn debounce_allows(debounce: &mut HashMap<Uuid, Instant>, wallet_id: Uuid, window: Duration) -> bool {
    match debounce.get(&wallet_id) {
        Some(last) if last.elapsed() < window => false,
        _ => {
            debounce.insert(wallet_id, Instant::now());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debounce_coalesces_bursts() {
        let mut debounce = HashMap::new();
        let wallet = Uuid::new_v4();
        let window = Duration::from_secs(30);

        assert!(debounce_allows(&mut debounce, wallet, window));
        assert!(!debounce_allows(&mut debounce, wallet, window));
        assert!(!debounce_allows(&mut debounce, wallet, window));

        // A different wallet is independent.
        assert!(debounce_allows(&mut debounce, Uuid::new_v4(), window));
    }

    #[test]
    fn test_debounce_reopens_after_window() {
        let mut debounce = HashMap::new();
        let wallet = Uuid::new_v4();

        assert!(debounce_allows(&mut debounce, wallet, Duration::ZERO));
        assert!(debounce_allows(&mut debounce, wallet, Duration::ZERO));
    }
}
