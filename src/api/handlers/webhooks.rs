use axum::extract::State;
use axum::Json;
use metrics::counter;
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
    pub response_time_ms: u128,
}

/// Enhanced-dialect webhook ingress.
pub async fn helius(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<WebhookAck> {
    accept(&state, payload).await
}

/// RPC-dialect webhook ingress.
pub async fn rpc(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<WebhookAck> {
    accept(&state, payload).await
}

/// Acknowledge before processing. Providers enforce a hard response-time
/// ceiling, so the payload is handed to the normalizer consumer through a
/// channel and the outcome is never reflected in this response — a failure
/// here would only trigger a redelivery storm.
async fn accept(state: &AppState, payload: serde_json::Value) -> Json<WebhookAck> {
    let start = Instant::now();
    counter!("webhook_payloads_total").increment(1);

    let message = match state.ingest_tx.try_send(payload) {
        Ok(()) => "accepted".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Webhook buffer full, payload dropped");
            "accepted".to_string()
        }
    };

    Json(WebhookAck {
        success: true,
        message,
        response_time_ms: start.elapsed().as_millis(),
    })
}
