use std::sync::Arc;
use std::time::Duration;

use soltrack::api::router::create_router;
use soltrack::config::AppConfig;
use soltrack::db;
use soltrack::ingestion::normalizer;
use soltrack::ingestion::worker::{run_ingestion_worker, IngestionConfig};
use soltrack::metrics::init_metrics;
use soltrack::services::queue_drainer::run_queue_drainer;
use soltrack::services::signal_expiry::run_signal_expiry;
use soltrack::valuation::ValuationResolver;
use soltrack::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let metrics_handle = init_metrics();

    tracing::info!("Connecting to database...");
    let db = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    // --- Webhook ingress → normalizer consumer ---
    // Handlers acknowledge immediately and push the raw payload here; this
    // consumer is the only place normalization failures are observed.
    let (ingest_tx, mut ingest_rx) =
        tokio::sync::mpsc::channel::<serde_json::Value>(config.webhook_buffer);

    let normalizer_db = db.clone();
    tokio::spawn(async move {
        while let Some(payload) = ingest_rx.recv().await {
            match normalizer::process_payload(&normalizer_db, &payload).await {
                Ok(outcome) if outcome.staged > 0 => {
                    tracing::info!(
                        staged = outcome.staged,
                        duplicates = outcome.duplicates,
                        skipped = outcome.skipped,
                        "Webhook payload normalized"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Webhook payload processing failed"),
            }
        }
        tracing::warn!("Webhook payload channel closed");
    });

    // --- Ingestion worker: staged → valuated ledger entries ---
    let resolver = Arc::new(ValuationResolver::with_default_chain(
        reqwest::Client::new(),
        Duration::from_secs(config.valuation_cache_ttl_secs),
        Duration::from_secs(config.source_timeout_secs),
    ));

    let ingestion_config = IngestionConfig {
        batch_size: config.ingest_batch_size,
        poll_interval: Duration::from_secs(config.ingest_poll_secs),
        debounce_window: config.debounce_window(),
        consensus_window: config.consensus_window(),
        signal_ttl: config.signal_ttl(),
    };

    let worker_db = db.clone();
    let worker_resolver = resolver.clone();
    tokio::spawn(async move {
        run_ingestion_worker(worker_db, worker_resolver, ingestion_config).await;
    });

    // --- Processing queue drainer: per-wallet PnL recomputation ---
    let drainer_db = db.clone();
    let queue_poll = Duration::from_secs(config.queue_poll_secs);
    let retry_delay = config.queue_retry_delay();
    tokio::spawn(async move {
        run_queue_drainer(drainer_db, queue_poll, retry_delay).await;
    });

    // --- Signal expiry sweep ---
    let expiry_db = db.clone();
    let sweep_interval = Duration::from_secs(config.signal_expiry_sweep_secs);
    tokio::spawn(async move {
        run_signal_expiry(expiry_db, sweep_interval).await;
    });

    // --- Startup backfill: recompute derived views for tracked wallets ---
    let backfill_db = db.clone();
    tokio::spawn(async move {
        if let Err(e) = enqueue_startup_backfill(&backfill_db).await {
            tracing::error!(error = %e, "Startup backfill enqueue failed");
        }
    });

    let state = AppState {
        db,
        config,
        ingest_tx,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

/// Queue a lot-matching pass for every active wallet so derived views catch
/// up with anything ingested while the service was down.
async fn enqueue_startup_backfill(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    use soltrack::db::{queue_repo, wallet_repo};
    use soltrack::models::JobType;

    let wallets = wallet_repo::get_active_wallets(pool).await?;
    let count = wallets.len();
    for wallet in wallets {
        queue_repo::enqueue(pool, wallet.id, JobType::Backfill, -1).await?;
    }

    if count > 0 {
        tracing::info!(wallets = count, "Startup backfill enqueued");
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
