use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;

use crate::AppState;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /api/payments/webhook: processor notifications.
///
/// Any non-2xx makes the processor retry, so only failures worth retrying (or
/// requests that will never be valid) get one.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = header_str(&headers, "x-signature");
    let request_id = header_str(&headers, "x-request-id");

    match state
        .reconciler
        .handle_notification(&body, signature, request_id)
        .await
    {
        Ok(outcome) => {
            tracing::info!("Webhook handled: {:?}", outcome);
            StatusCode::OK
        }
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                tracing::error!("Webhook failed ({}): {}", status, e);
            } else {
                tracing::warn!("Webhook rejected ({}): {}", status, e);
            }
            status
        }
    }
}
