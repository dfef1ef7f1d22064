mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

use soltrack::analytics::lot_matcher;
use soltrack::db::{lot_repo, signal_repo, staged_trade_repo, trade_repo};
use soltrack::ingestion::normalizer;
use soltrack::ingestion::worker::{drain_once, IngestionConfig};
use soltrack::models::{BaseToken, Side, StagedStatus};
use soltrack::valuation::{PriceCache, PriceSource, SourceError, ValuationResolver};

/// A deterministic price source for integration tests.
struct FixedSource {
    price: Option<Decimal>,
}

#[async_trait]
impl PriceSource for FixedSource {
    fn id(&self) -> &'static str {
        "fixed"
    }

    async fn price_usd(
        &self,
        _base: BaseToken,
        _at: DateTime<Utc>,
    ) -> Result<Decimal, SourceError> {
        self.price
            .ok_or_else(|| SourceError::Unexpected("forced failure".into()))
    }
}

fn resolver_with_price(price: Option<Decimal>) -> ValuationResolver {
    ValuationResolver::new(
        vec![Box::new(FixedSource { price })],
        PriceCache::new(Duration::ZERO),
        Duration::from_secs(1),
    )
}

fn ingestion_config() -> IngestionConfig {
    IngestionConfig {
        batch_size: 50,
        poll_interval: Duration::from_secs(1),
        debounce_window: Duration::from_secs(30),
        consensus_window: chrono::Duration::minutes(120),
        signal_ttl: chrono::Duration::minutes(240),
    }
}

fn enhanced_buy_payload(signature: &str, wallet: &str, mint: &str, sol_spent: i64, tokens: &str) -> serde_json::Value {
    json!({
        "transactions": [{
            "signature": signature,
            "type": "SWAP",
            "source": "RAYDIUM",
            "timestamp": Utc::now().timestamp(),
            "accountData": [{
                "account": wallet,
                "nativeBalanceChange": -sol_spent,
                "tokenBalanceChanges": [{
                    "userAccount": wallet,
                    "mint": mint,
                    "rawTokenAmount": { "tokenAmount": tokens, "decimals": 6 }
                }]
            }]
        }]
    })
}

#[tokio::test]
async fn test_duplicate_webhook_yields_one_staged_and_one_trade() {
    let pool = common::setup_test_db().await;
    let wallet = common::seed_wallet(&pool, "WALLET_IDEM_001").await;

    let payload = enhanced_buy_payload(
        "sig_idem_001",
        "WALLET_IDEM_001",
        "MintIdem",
        1_000_000_000, // 1 SOL
        "100000000",   // 100 tokens
    );

    let first = normalizer::process_payload(&pool, &payload)
        .await
        .expect("first delivery");
    assert_eq!(first.staged, 1);

    let second = normalizer::process_payload(&pool, &payload)
        .await
        .expect("second delivery");
    assert_eq!(second.staged, 0);
    assert_eq!(second.duplicates, 1, "duplicate delivery must be a silent no-op");

    let resolver = resolver_with_price(Some(Decimal::from(100)));
    let config = ingestion_config();
    let mut debounce = HashMap::new();

    let processed = drain_once(&pool, &resolver, &config, &mut debounce)
        .await
        .expect("drain");
    assert_eq!(processed, 1);

    // Redelivery after processing is still absorbed.
    normalizer::process_payload(&pool, &payload)
        .await
        .expect("third delivery");
    drain_once(&pool, &resolver, &config, &mut debounce)
        .await
        .expect("second drain");

    let trades = trade_repo::get_trades_for_matching(&pool, wallet.id, None, None)
        .await
        .expect("trades");
    assert_eq!(trades.len(), 1, "exactly one ledger entry per identity tuple");
    assert_eq!(trades[0].side, Side::Buy);
    assert_eq!(trades[0].amount_base, Decimal::ONE);
    assert_eq!(trades[0].value_usd, Some(Decimal::from(100)));
    assert_eq!(trades[0].valuation_source.as_deref(), Some("fixed"));
}

#[tokio::test]
async fn test_valuation_failure_leaves_staged_retryable() {
    let pool = common::setup_test_db().await;
    let wallet = common::seed_wallet(&pool, "WALLET_RETRY_001").await;

    let payload = enhanced_buy_payload(
        "sig_retry_001",
        "WALLET_RETRY_001",
        "MintRetry",
        2_000_000_000,
        "50000000",
    );
    normalizer::process_payload(&pool, &payload)
        .await
        .expect("delivery");

    let config = ingestion_config();
    let mut debounce = HashMap::new();

    // All sources down: no trade, record marked failed but still eligible.
    let failing = resolver_with_price(None);
    let processed = drain_once(&pool, &failing, &config, &mut debounce)
        .await
        .expect("drain with failing resolver");
    assert_eq!(processed, 0);

    let trades = trade_repo::get_trades_for_matching(&pool, wallet.id, None, None)
        .await
        .expect("trades");
    assert!(trades.is_empty(), "no fabricated price, no trade");

    let failed = staged_trade_repo::count_by_status(&pool, StagedStatus::Failed)
        .await
        .expect("count");
    assert_eq!(failed, 1);

    // Sources recover: the same staged row processes on the next poll.
    let working = resolver_with_price(Some(Decimal::from(80)));
    let processed = drain_once(&pool, &working, &config, &mut debounce)
        .await
        .expect("drain with working resolver");
    assert_eq!(processed, 1);

    let trades = trade_repo::get_trades_for_matching(&pool, wallet.id, None, None)
        .await
        .expect("trades");
    assert_eq!(trades.len(), 1);
}

#[tokio::test]
async fn test_two_wallet_buys_raise_one_consensus_signal() {
    let pool = common::setup_test_db().await;
    common::seed_wallet(&pool, "WALLET_CONS_A").await;
    common::seed_wallet(&pool, "WALLET_CONS_B").await;
    common::seed_wallet(&pool, "WALLET_CONS_C").await;

    let resolver = resolver_with_price(Some(Decimal::from(100)));
    let config = ingestion_config();
    let mut debounce = HashMap::new();

    for (sig, wallet) in [
        ("sig_cons_a", "WALLET_CONS_A"),
        ("sig_cons_b", "WALLET_CONS_B"),
    ] {
        let payload =
            enhanced_buy_payload(sig, wallet, "MintConsensus", 1_000_000_000, "1000000000");
        normalizer::process_payload(&pool, &payload)
            .await
            .expect("delivery");
    }

    drain_once(&pool, &resolver, &config, &mut debounce)
        .await
        .expect("drain");

    let signals = signal_repo::list_signals(&pool, None, 10).await.expect("signals");
    assert_eq!(signals.len(), 1, "one signal per cluster, not per buy");
    assert_eq!(signals[0].wallet_count(), 2);

    // A third wallet joins the cluster: the signal extends, no duplicate.
    let payload = enhanced_buy_payload(
        "sig_cons_c",
        "WALLET_CONS_C",
        "MintConsensus",
        1_000_000_000,
        "500000000",
    );
    normalizer::process_payload(&pool, &payload)
        .await
        .expect("delivery");
    drain_once(&pool, &resolver, &config, &mut debounce)
        .await
        .expect("drain");

    let signals = signal_repo::list_signals(&pool, None, 10).await.expect("signals");
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].wallet_count(), 3);
}

#[tokio::test]
async fn test_recompute_persists_spec_scenario() {
    // Buy 100 TOKEN for 1.0 SOL, sell 40 for 0.5 SOL: one closed lot
    // (cost 0.4, proceeds 0.5, pnl 0.1) and a 60-token open position.
    let pool = common::setup_test_db().await;
    let wallet = common::seed_wallet(&pool, "WALLET_PNL_001").await;
    let token = common::seed_token(&pool, "MintPnl").await;

    common::seed_trade(
        &pool,
        wallet.id,
        token.id,
        Side::Buy,
        Decimal::from(100),
        Decimal::ONE,
        60,
    )
    .await;
    common::seed_trade(
        &pool,
        wallet.id,
        token.id,
        Side::Sell,
        Decimal::from(40),
        Decimal::new(5, 1),
        30,
    )
    .await;

    let summary = lot_matcher::process_trades_for_wallet(&pool, wallet.id, None, None)
        .await
        .expect("recompute");
    assert_eq!(summary.closed_lots, 1);
    assert_eq!(summary.open_positions, 1);

    let lots = lot_repo::get_closed_lots(&pool, wallet.id, None).await.expect("lots");
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].size, Decimal::from(40));
    assert_eq!(lots[0].cost_basis, Decimal::new(4, 1));
    assert_eq!(lots[0].proceeds, Decimal::new(5, 1));
    assert_eq!(lots[0].realized_pnl, Decimal::new(1, 1));
    assert!(lots[0].cost_known);

    let positions = lot_repo::get_open_positions(&pool, Some(wallet.id))
        .await
        .expect("positions");
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].size, Decimal::from(60));
    assert_eq!(positions[0].avg_entry_price, Decimal::new(1, 2));

    // Recomputation replaces wholesale: running again never duplicates.
    lot_matcher::process_trades_for_wallet(&pool, wallet.id, None, None)
        .await
        .expect("second recompute");
    let lots = lot_repo::get_closed_lots(&pool, wallet.id, None).await.expect("lots");
    assert_eq!(lots.len(), 1);
}

#[tokio::test]
async fn test_untracked_wallet_payload_is_skipped() {
    let pool = common::setup_test_db().await;

    let payload = enhanced_buy_payload(
        "sig_untracked_001",
        "WALLET_NOBODY_TRACKS",
        "MintX",
        1_000_000_000,
        "1000000",
    );

    let outcome = normalizer::process_payload(&pool, &payload)
        .await
        .expect("delivery");
    assert_eq!(outcome.staged, 0);
    assert_eq!(outcome.skipped, 1);
}
