use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{BaseToken, WSOL_MINT};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// One link of the valuation fallback chain. Implementations are thin
/// clients over a single upstream endpoint; the resolver owns ordering,
/// timeouts, and caching.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Stable identifier stamped into trade provenance.
    fn id(&self) -> &'static str;

    /// USD price of one unit of `base` at (or near) `at`. Sources without
    /// historical endpoints return their current quote.
    async fn price_usd(&self, base: BaseToken, at: DateTime<Utc>) -> Result<Decimal, SourceError>;
}

// ---------------------------------------------------------------------------
// Binance spot history — the only source answering at the trade's own
// timestamp, which is why it leads the chain.
// ---------------------------------------------------------------------------

const BINANCE_API_BASE: &str = "https://api.binance.com";

#[derive(Debug, Clone)]
pub struct BinanceSource {
    http: Client,
    base_url: String,
}

impl BinanceSource {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: BINANCE_API_BASE.into(),
        }
    }

    fn symbol(base: BaseToken) -> &'static str {
        match base {
            BaseToken::Sol => "SOLUSDT",
            BaseToken::Usdc => "USDCUSDT",
            BaseToken::Usdt => "USDTUSD",
        }
    }
}

#[async_trait]
impl PriceSource for BinanceSource {
    fn id(&self) -> &'static str {
        "binance"
    }

    async fn price_usd(&self, base: BaseToken, at: DateTime<Utc>) -> Result<Decimal, SourceError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let start_ms = at.timestamp_millis().to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", Self::symbol(base)),
                ("interval", "1m"),
                ("startTime", start_ms.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        // Kline rows are positional arrays; index 4 is the close price.
        let klines: Vec<Vec<serde_json::Value>> = resp.json().await?;
        let close = klines
            .first()
            .and_then(|row| row.get(4))
            .and_then(|v| v.as_str())
            .ok_or_else(|| SourceError::Unexpected("no kline for timestamp".into()))?;

        close
            .parse::<Decimal>()
            .map_err(|e| SourceError::Unexpected(format!("bad close price: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Jupiter price API — on-chain aggregator, current quote only.
// ---------------------------------------------------------------------------

const JUPITER_API_BASE: &str = "https://lite-api.jup.ag";

#[derive(Debug, Deserialize)]
struct JupiterPriceResponse {
    data: HashMap<String, JupiterPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct JupiterPriceEntry {
    price: String,
}

#[derive(Debug, Clone)]
pub struct JupiterSource {
    http: Client,
    base_url: String,
}

impl JupiterSource {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: JUPITER_API_BASE.into(),
        }
    }
}

#[async_trait]
impl PriceSource for JupiterSource {
    fn id(&self) -> &'static str {
        "jupiter"
    }

    async fn price_usd(&self, base: BaseToken, _at: DateTime<Utc>) -> Result<Decimal, SourceError> {
        let mint = match base {
            BaseToken::Sol => WSOL_MINT,
            BaseToken::Usdc => crate::models::USDC_MINT,
            BaseToken::Usdt => crate::models::USDT_MINT,
        };

        let url = format!("{}/price/v2", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("ids", mint)])
            .send()
            .await?
            .error_for_status()?;

        let body: JupiterPriceResponse = resp.json().await?;
        let entry = body
            .data
            .get(mint)
            .ok_or_else(|| SourceError::Unexpected("mint missing from response".into()))?;

        entry
            .price
            .parse::<Decimal>()
            .map_err(|e| SourceError::Unexpected(format!("bad price: {e}")))
    }
}

// ---------------------------------------------------------------------------
// DexScreener — secondary aggregator.
// ---------------------------------------------------------------------------

const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com";

#[derive(Debug, Deserialize)]
struct DexScreenerResponse {
    pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerPair {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DexScreenerSource {
    http: Client,
    base_url: String,
}

impl DexScreenerSource {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: DEXSCREENER_API_BASE.into(),
        }
    }
}

#[async_trait]
impl PriceSource for DexScreenerSource {
    fn id(&self) -> &'static str {
        "dexscreener"
    }

    async fn price_usd(&self, base: BaseToken, _at: DateTime<Utc>) -> Result<Decimal, SourceError> {
        let mint = match base {
            BaseToken::Sol => WSOL_MINT,
            BaseToken::Usdc => crate::models::USDC_MINT,
            BaseToken::Usdt => crate::models::USDT_MINT,
        };

        let url = format!("{}/latest/dex/tokens/{}", self.base_url, mint);
        let resp = self.http.get(&url).send().await?.error_for_status()?;

        let body: DexScreenerResponse = resp.json().await?;
        let price = body
            .pairs
            .unwrap_or_default()
            .into_iter()
            .find_map(|p| p.price_usd)
            .ok_or_else(|| SourceError::Unexpected("no priced pairs".into()))?;

        price
            .parse::<Decimal>()
            .map_err(|e| SourceError::Unexpected(format!("bad priceUsd: {e}")))
    }
}

// ---------------------------------------------------------------------------
// CoinGecko — last resort.
// ---------------------------------------------------------------------------

const COINGECKO_API_BASE: &str = "https://api.coingecko.com";

#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    http: Client,
    base_url: String,
}

impl CoinGeckoSource {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: COINGECKO_API_BASE.into(),
        }
    }

    fn coin_id(base: BaseToken) -> &'static str {
        match base {
            BaseToken::Sol => "solana",
            BaseToken::Usdc => "usd-coin",
            BaseToken::Usdt => "tether",
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn id(&self) -> &'static str {
        "coingecko"
    }

    async fn price_usd(&self, base: BaseToken, _at: DateTime<Utc>) -> Result<Decimal, SourceError> {
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("ids", Self::coin_id(base)), ("vs_currencies", "usd")])
            .send()
            .await?
            .error_for_status()?;

        let body: HashMap<String, HashMap<String, f64>> = resp.json().await?;
        let usd = body
            .get(Self::coin_id(base))
            .and_then(|m| m.get("usd"))
            .copied()
            .ok_or_else(|| SourceError::Unexpected("usd price missing".into()))?;

        Decimal::try_from(usd).map_err(|e| SourceError::Unexpected(format!("bad price: {e}")))
    }
}
