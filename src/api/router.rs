use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::require_auth;
use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes — no authentication required. Webhook ingress stays
    // public: providers don't send bearer tokens, and the handler only
    // enqueues the payload.
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render))
        .route("/webhooks/helius", post(handlers::webhooks::helius))
        .route("/webhooks/rpc", post(handlers::webhooks::rpc));

    // Protected read API — require Bearer token when API_TOKEN is set
    let protected = Router::new()
        .route("/api/wallets", get(handlers::wallets::list).post(handlers::wallets::create))
        .route("/api/wallets/:address", get(handlers::wallets::detail))
        .route("/api/trades", get(handlers::trades::list))
        .route("/api/signals", get(handlers::signals::list))
        .route("/api/positions", get(handlers::positions::list))
        .route("/api/lots", get(handlers::positions::lots))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // CORS: dashboard is proxied from the same origin; direct access needs
    // the token anyway.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
