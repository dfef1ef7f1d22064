pub mod job;
pub mod lot;
pub mod signal;
pub mod staged_trade;
pub mod token;
pub mod trade;
pub mod wallet;

pub use job::QueueJob;
pub use lot::{ClosedLot, NewClosedLot, NewOpenPosition, OpenPosition};
pub use signal::Signal;
pub use staged_trade::{NewStagedTrade, StagedTrade};
pub use token::Token;
pub use trade::Trade;
pub use wallet::Wallet;

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Direction of a swap from the tracked wallet's perspective.
///
/// `Void` marks token-for-token swaps with no net base-currency exposure;
/// they are recorded for completeness but skip valuation and FIFO matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
    Void,
}

impl Side {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            "void" => Some(Side::Void),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Void => "void",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BaseToken
// ---------------------------------------------------------------------------

pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

/// The non-target side of a swap. Stablecoins value 1:1 with USD; SOL goes
/// through the price-source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum BaseToken {
    Sol,
    Usdc,
    Usdt,
}

impl BaseToken {
    /// Classify a mint as a base-currency leg, if it is one.
    pub fn from_mint(mint: &str) -> Option<Self> {
        match mint {
            WSOL_MINT => Some(BaseToken::Sol),
            USDC_MINT => Some(BaseToken::Usdc),
            USDT_MINT => Some(BaseToken::Usdt),
            _ => None,
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, BaseToken::Usdc | BaseToken::Usdt)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseToken::Sol => "SOL",
            BaseToken::Usdc => "USDC",
            BaseToken::Usdt => "USDT",
        }
    }
}

impl fmt::Display for BaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum StagedStatus {
    Pending,
    Processed,
    Failed,
}

impl fmt::Display for StagedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagedStatus::Pending => f.write_str("pending"),
            StagedStatus::Processed => f.write_str("processed"),
            StagedStatus::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Executed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum JobType {
    LotMatching,
    Backfill,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::LotMatching => "lot_matching",
            JobType::Backfill => "backfill",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
