use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Short-TTL price cache keyed by `(source, minute-rounded timestamp)`.
///
/// Trades cluster in bursts around the same minute; one upstream call per
/// source per minute covers all of them. Injected into the resolver so
/// tests can clear or pre-seed it.
#[derive(Debug)]
pub struct PriceCache {
    ttl: Duration,
    inner: Mutex<HashMap<(&'static str, i64), CacheEntry>>,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    price: Decimal,
    inserted: Instant,
}

/// Round a timestamp down to its minute, the cache's time granularity.
pub fn minute_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp() / 60
}

impl PriceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, source: &'static str, at: DateTime<Utc>) -> Option<Decimal> {
        let key = (source, minute_bucket(at));
        let mut map = self.inner.lock().ok()?;
        match map.get(&key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.price),
            Some(_) => {
                map.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, source: &'static str, at: DateTime<Utc>, price: Decimal) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(
                (source, minute_bucket(at)),
                CacheEntry {
                    price,
                    inserted: Instant::now(),
                },
            );
        }
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.lock() {
            map.clear();
        }
    }
}
