pub mod consensus;
pub mod lot_matcher;

pub use consensus::{check_consensus_after_buy, cluster_buys, BuyCluster, BuyEvent};
pub use lot_matcher::{match_lots, process_trades_for_wallet, RecomputeSummary};
