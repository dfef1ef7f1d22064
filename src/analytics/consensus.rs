use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{signal_repo, trade_repo};
use crate::models::Signal;

/// One buy trade, as seen by the clustering pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyEvent {
    pub trade_id: Uuid,
    pub wallet_id: Uuid,
    pub traded_at: DateTime<Utc>,
}

/// A chained group of buys: every consecutive pair is at most the window
/// apart, so the cluster as a whole may span longer than one window.
#[derive(Debug, Clone)]
pub struct BuyCluster {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Distinct wallets, each counted by its earliest buy only, in order of
    /// first appearance.
    pub wallets: Vec<Uuid>,
    pub trade_ids: Vec<Uuid>,
}

impl BuyCluster {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

// ---------------------------------------------------------------------------
// Clustering (pure)
// ---------------------------------------------------------------------------

/// Partition time-sorted buys into chained clusters.
///
/// The window slides: buys at t, t+1h and t+1h50m chain into one cluster
/// under a 2h window even though the first and last are more than 2h apart.
/// A wallet buying twice inside a cluster is counted once, by its earliest
/// buy.
pub fn cluster_buys(buys: &[BuyEvent], window: Duration) -> Vec<BuyCluster> {
    let mut clusters: Vec<BuyCluster> = Vec::new();

    for buy in buys {
        let chained = clusters
            .last()
            .is_some_and(|c| buy.traded_at - c.end <= window);

        if chained {
            let cluster = clusters.last_mut().expect("non-empty by chained check");
            cluster.end = cluster.end.max(buy.traded_at);
            cluster.trade_ids.push(buy.trade_id);
            if !cluster.wallets.contains(&buy.wallet_id) {
                cluster.wallets.push(buy.wallet_id);
            }
        } else {
            clusters.push(BuyCluster {
                start: buy.traded_at,
                end: buy.traded_at,
                wallets: vec![buy.wallet_id],
                trade_ids: vec![buy.trade_id],
            });
        }
    }

    clusters
}

// ---------------------------------------------------------------------------
// Detection — ties the DB queries to the pure clustering
// ---------------------------------------------------------------------------

/// Run consensus detection after a committed buy.
///
/// Returns the signal when the buy's cluster holds ≥2 distinct wallets.
/// Re-running after a late-arriving trade extends the existing signal for
/// the cluster or is a no-op — never a duplicate.
pub async fn check_consensus_after_buy(
    pool: &PgPool,
    trade_id: Uuid,
    token_id: Uuid,
    wallet_id: Uuid,
    at: DateTime<Utc>,
    window: Duration,
    signal_ttl: Duration,
) -> anyhow::Result<Option<Signal>> {
    let since = at - window;
    let trades = trade_repo::get_token_buys_in_window(pool, token_id, since, at).await?;

    let buys: Vec<BuyEvent> = trades
        .iter()
        .map(|t| BuyEvent {
            trade_id: t.id,
            wallet_id: t.wallet_id,
            traded_at: t.traded_at,
        })
        .collect();

    let clusters = cluster_buys(&buys, window);
    let Some(cluster) = clusters
        .into_iter()
        .find(|c| c.trade_ids.contains(&trade_id) || c.contains(at))
    else {
        return Ok(None);
    };

    if cluster.wallets.len() < 2 {
        return Ok(None);
    }

    let expires_at = cluster.end + signal_ttl;

    // A signal overlapping this cluster's range absorbs it; only a genuinely
    // new cluster creates a row. The (token, cluster_start) constraint
    // backstops concurrent detectors.
    if let Some(existing) =
        signal_repo::find_overlapping(pool, token_id, cluster.start, cluster.end).await?
    {
        let wallets = merge_wallets(&existing, &cluster.wallets);
        if wallets.len() as i64 == existing.wallet_count()
            && existing.cluster_end >= cluster.end
        {
            // Nothing new: detection after a duplicate or in-range trade.
            return Ok(Some(existing));
        }

        let meta = wallets_meta(&wallets);
        let signal =
            signal_repo::extend_signal(pool, existing.id, meta, cluster.end, expires_at).await?;

        tracing::info!(
            signal_id = %signal.id,
            token_id = %token_id,
            wallet_count = wallets.len(),
            "Consensus signal extended"
        );
        return Ok(Some(signal));
    }

    let meta = wallets_meta(&cluster.wallets);
    let signal = signal_repo::upsert_signal(
        pool,
        wallet_id,
        token_id,
        trade_id,
        meta,
        cluster.start,
        cluster.end,
        expires_at,
    )
    .await?;

    counter!("consensus_signals_total").increment(1);
    tracing::info!(
        signal_id = %signal.id,
        token_id = %token_id,
        wallet_count = cluster.wallets.len(),
        window_mins = window.num_minutes(),
        "Consensus signal created"
    );

    Ok(Some(signal))
}

fn merge_wallets(existing: &Signal, incoming: &[Uuid]) -> Vec<Uuid> {
    let mut wallets: Vec<Uuid> = existing
        .meta
        .get("wallets")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect()
        })
        .unwrap_or_default();

    for w in incoming {
        if !wallets.contains(w) {
            wallets.push(*w);
        }
    }

    wallets
}

fn wallets_meta(wallets: &[Uuid]) -> serde_json::Value {
    json!({
        "wallet_count": wallets.len(),
        "wallets": wallets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(wallet: Uuid, at: DateTime<Utc>) -> BuyEvent {
        BuyEvent {
            trade_id: Uuid::new_v4(),
            wallet_id: wallet,
            traded_at: at,
        }
    }

    #[test]
    fn test_chained_buys_merge_beyond_one_window() {
        // A at t, B at t+90m, C at t+170m with a 120m window: every
        // consecutive gap fits, so all three chain into one cluster even
        // though A and C are 170m apart.
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let buys = vec![
            buy(a, t0),
            buy(b, t0 + Duration::minutes(90)),
            buy(c, t0 + Duration::minutes(170)),
        ];

        let clusters = cluster_buys(&buys, Duration::minutes(120));

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].wallets.len(), 3);
        assert_eq!(clusters[0].start, t0);
        assert_eq!(clusters[0].end, t0 + Duration::minutes(170));
    }

    #[test]
    fn test_gap_beyond_window_splits_clusters() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let buys = vec![
            buy(a, t0),
            buy(b, t0 + Duration::minutes(121)),
        ];

        let clusters = cluster_buys(&buys, Duration::minutes(120));

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].wallets, vec![a]);
        assert_eq!(clusters[1].wallets, vec![b]);
    }

    #[test]
    fn test_double_buy_wallet_counted_once() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let buys = vec![
            buy(a, t0),
            buy(a, t0 + Duration::minutes(10)),
            buy(b, t0 + Duration::minutes(20)),
            buy(a, t0 + Duration::minutes(30)),
        ];

        let clusters = cluster_buys(&buys, Duration::minutes(120));

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].wallets.len(), 2);
        // Earliest-first ordering is preserved.
        assert_eq!(clusters[0].wallets, vec![a, b]);
    }

    #[test]
    fn test_boundary_gap_exactly_window_chains() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let buys = vec![buy(a, t0), buy(b, t0 + Duration::minutes(120))];

        let clusters = cluster_buys(&buys, Duration::minutes(120));

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].wallets.len(), 2);
    }

    #[test]
    fn test_empty_input_yields_no_clusters() {
        assert!(cluster_buys(&[], Duration::minutes(120)).is_empty());
    }

    #[test]
    fn test_merge_wallets_unions_without_duplicates() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let existing = Signal {
            id: Uuid::new_v4(),
            signal_type: crate::models::Side::Buy,
            wallet_id: a,
            token_id: Uuid::new_v4(),
            original_trade_id: None,
            model: "consensus".into(),
            meta: json!({ "wallet_count": 2, "wallets": [a, b] }),
            cluster_start: Utc::now(),
            cluster_end: Utc::now(),
            status: crate::models::SignalStatus::Active,
            expires_at: None,
            created_at: None,
            updated_at: None,
        };

        let merged = merge_wallets(&existing, &[b, c]);
        assert_eq!(merged, vec![a, b, c]);
    }
}
