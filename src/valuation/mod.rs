pub mod cache;
pub mod sources;

pub use cache::PriceCache;
pub use sources::{
    BinanceSource, CoinGeckoSource, DexScreenerSource, JupiterSource, PriceSource, SourceError,
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::models::BaseToken;

#[derive(Debug, Error)]
pub enum ValuationError {
    /// Every source in the chain failed. The caller must treat this as a
    /// transient failure and retry later, never as a zero-value trade.
    #[error("all price sources failed for {base} at {at}")]
    AllSourcesFailed { base: BaseToken, at: DateTime<Utc> },
}

/// A resolved USD valuation, with the winning source stamped for audit.
#[derive(Debug, Clone)]
pub struct Valuation {
    pub amount_base_usd: Decimal,
    pub price_usd_per_token: Option<Decimal>,
    pub price_usd_per_base: Decimal,
    pub source: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Resolves base-currency amounts to USD through an ordered fallback chain,
/// evaluated at the trade's own timestamp.
pub struct ValuationResolver {
    sources: Vec<Box<dyn PriceSource>>,
    cache: PriceCache,
    source_timeout: Duration,
}

impl ValuationResolver {
    pub fn new(sources: Vec<Box<dyn PriceSource>>, cache: PriceCache, source_timeout: Duration) -> Self {
        Self {
            sources,
            cache,
            source_timeout,
        }
    }

    /// The default production chain: exchange spot history, then on-chain
    /// aggregator, then secondary aggregator, then last resort.
    pub fn with_default_chain(http: reqwest::Client, cache_ttl: Duration, source_timeout: Duration) -> Self {
        let sources: Vec<Box<dyn PriceSource>> = vec![
            Box::new(BinanceSource::new(http.clone())),
            Box::new(JupiterSource::new(http.clone())),
            Box::new(DexScreenerSource::new(http.clone())),
            Box::new(CoinGeckoSource::new(http)),
        ];

        Self::new(sources, PriceCache::new(cache_ttl), source_timeout)
    }

    /// Value a swap's base-currency leg in USD.
    ///
    /// Stablecoins resolve 1:1 without a network call. Everything else walks
    /// the chain: the first source returning a positive price wins, and its
    /// id is stamped into the result.
    pub async fn valuate(
        &self,
        base: BaseToken,
        amount_base_raw: Decimal,
        amount_token: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Valuation, ValuationError> {
        if base.is_stable() {
            return Ok(self.build(base, amount_base_raw, amount_token, Decimal::ONE, "stable", at));
        }

        let price = self.resolve_price(base, at).await?;
        Ok(self.build(base, amount_base_raw, amount_token, price.0, price.1, at))
    }

    async fn resolve_price(
        &self,
        base: BaseToken,
        at: DateTime<Utc>,
    ) -> Result<(Decimal, &'static str), ValuationError> {
        for source in &self.sources {
            let id = source.id();

            if let Some(price) = self.cache.get(id, at) {
                return Ok((price, id));
            }

            match tokio::time::timeout(self.source_timeout, source.price_usd(base, at)).await {
                Ok(Ok(price)) if price > Decimal::ZERO => {
                    self.cache.insert(id, at, price);
                    return Ok((price, id));
                }
                Ok(Ok(price)) => {
                    tracing::warn!(source = id, %price, "Price source returned non-positive price");
                }
                Ok(Err(e)) => {
                    tracing::warn!(source = id, error = %e, "Price source failed, falling through");
                }
                Err(_) => {
                    tracing::warn!(source = id, "Price source timed out, falling through");
                }
            }
        }

        Err(ValuationError::AllSourcesFailed { base, at })
    }

    fn build(
        &self,
        _base: BaseToken,
        amount_base_raw: Decimal,
        amount_token: Decimal,
        price_usd_per_base: Decimal,
        source: &'static str,
        at: DateTime<Utc>,
    ) -> Valuation {
        let amount_base_usd = amount_base_raw * price_usd_per_base;
        let price_usd_per_token = if amount_token.is_zero() {
            None
        } else {
            Some(amount_base_usd / amount_token)
        };

        Valuation {
            amount_base_usd,
            price_usd_per_token,
            price_usd_per_base,
            source,
            timestamp: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct StubSource {
        id: &'static str,
        price: Option<Decimal>,
        calls: Arc<AtomicU32>,
    }

    impl StubSource {
        fn ok(id: &'static str, price: i64) -> (Box<dyn PriceSource>, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Box::new(StubSource {
                    id,
                    price: Some(Decimal::from(price)),
                    calls: calls.clone(),
                }),
                calls,
            )
        }

        fn failing(id: &'static str) -> (Box<dyn PriceSource>, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Box::new(StubSource {
                    id,
                    price: None,
                    calls: calls.clone(),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl PriceSource for StubSource {
        fn id(&self) -> &'static str {
            self.id
        }

        async fn price_usd(
            &self,
            _base: BaseToken,
            _at: DateTime<Utc>,
        ) -> Result<Decimal, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.price
                .ok_or_else(|| SourceError::Unexpected("stub failure".into()))
        }
    }

    fn resolver(sources: Vec<Box<dyn PriceSource>>) -> ValuationResolver {
        ValuationResolver::new(
            sources,
            PriceCache::new(Duration::from_secs(60)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_stablecoin_short_circuits() {
        let (failing, calls) = StubSource::failing("primary");
        let r = resolver(vec![failing]);

        let v = r
            .valuate(
                BaseToken::Usdc,
                Decimal::from(250),
                Decimal::from(1000),
                Utc::now(),
            )
            .await
            .expect("stable valuation");

        assert_eq!(v.source, "stable");
        assert_eq!(v.amount_base_usd, Decimal::from(250));
        assert_eq!(v.price_usd_per_token, Some(Decimal::new(25, 2)));
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no network call for stables");
    }

    #[tokio::test]
    async fn test_first_source_wins_and_is_stamped() {
        let (primary, _) = StubSource::ok("primary", 100);
        let (secondary, secondary_calls) = StubSource::ok("secondary", 999);
        let r = resolver(vec![primary, secondary]);

        let v = r
            .valuate(BaseToken::Sol, Decimal::from(2), Decimal::from(200), Utc::now())
            .await
            .expect("valuation");

        assert_eq!(v.source, "primary");
        assert_eq!(v.amount_base_usd, Decimal::from(200));
        assert_eq!(v.price_usd_per_token, Some(Decimal::ONE));
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_on_primary_failure() {
        let (primary, _) = StubSource::failing("primary");
        let (secondary, _) = StubSource::ok("secondary", 150);
        let r = resolver(vec![primary, secondary]);

        let v = r
            .valuate(BaseToken::Sol, Decimal::ONE, Decimal::from(10), Utc::now())
            .await
            .expect("fallback valuation");

        assert_eq!(v.source, "secondary");
        assert_eq!(v.amount_base_usd, Decimal::from(150));
    }

    #[tokio::test]
    async fn test_all_sources_failed_is_an_error() {
        let (a, _) = StubSource::failing("a");
        let (b, _) = StubSource::failing("b");
        let r = resolver(vec![a, b]);

        let result = r
            .valuate(BaseToken::Sol, Decimal::ONE, Decimal::ONE, Utc::now())
            .await;

        assert!(matches!(result, Err(ValuationError::AllSourcesFailed { .. })));
    }

    #[tokio::test]
    async fn test_same_minute_uses_cache() {
        let (primary, calls) = StubSource::ok("primary", 100);
        let r = resolver(vec![primary]);
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        r.valuate(BaseToken::Sol, Decimal::ONE, Decimal::ONE, at)
            .await
            .expect("first valuation");
        r.valuate(BaseToken::Sol, Decimal::ONE, Decimal::ONE, at + chrono::Duration::seconds(30))
            .await
            .expect("second valuation");

        assert_eq!(calls.load(Ordering::SeqCst), 1, "second call served from cache");
    }
}
