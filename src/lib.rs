pub mod analytics;
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod services;
pub mod valuation;

use tokio::sync::mpsc;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    /// Raw webhook payloads, handed from the HTTP handler to the normalizer
    /// consumer. Acknowledgment and processing are decoupled by design.
    pub ingest_tx: mpsc::Sender<serde_json::Value>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
