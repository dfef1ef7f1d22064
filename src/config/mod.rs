use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // API auth (optional — empty disables auth)
    pub api_token: Option<String>,

    // Webhook ingress
    pub webhook_buffer: usize,

    // Ingestion worker
    pub ingest_poll_secs: u64,
    pub ingest_batch_size: i64,
    pub debounce_secs: u64,

    // Consensus detection
    pub consensus_window_mins: i64,
    pub signal_ttl_mins: i64,
    pub signal_expiry_sweep_secs: u64,

    // Valuation
    pub valuation_cache_ttl_secs: u64,
    pub source_timeout_secs: u64,

    // Processing queue
    pub queue_poll_secs: u64,
    pub queue_retry_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),

            webhook_buffer: parse_or("WEBHOOK_BUFFER", 1024),

            ingest_poll_secs: parse_or("INGEST_POLL_SECS", 2),
            ingest_batch_size: parse_or("INGEST_BATCH_SIZE", 25),
            debounce_secs: parse_or("DEBOUNCE_SECS", 30),

            consensus_window_mins: parse_or("CONSENSUS_WINDOW_MINS", 120),
            signal_ttl_mins: parse_or("SIGNAL_TTL_MINS", 240),
            signal_expiry_sweep_secs: parse_or("SIGNAL_EXPIRY_SWEEP_SECS", 300),

            valuation_cache_ttl_secs: parse_or("VALUATION_CACHE_TTL_SECS", 120),
            source_timeout_secs: parse_or("SOURCE_TIMEOUT_SECS", 4),

            queue_poll_secs: parse_or("QUEUE_POLL_SECS", 5),
            queue_retry_secs: parse_or("QUEUE_RETRY_SECS", 60),
        })
    }

    pub fn consensus_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.consensus_window_mins)
    }

    pub fn signal_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.signal_ttl_mins)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn queue_retry_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.queue_retry_secs)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
