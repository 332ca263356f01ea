use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub db_ok: bool,
    /// Holds still waiting for the processor; a growing number means webhooks are not arriving.
    pub pending_holds: Option<i64>,
    pub cached_entries: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pending_holds: Option<i64> =
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE status = 'pending_payment'")
            .fetch_one(&state.db)
            .await
            .ok();
    let db_ok = pending_holds.is_some();

    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        db_ok,
        pending_holds,
        cached_entries: state.bookings.cache().len(),
    })
}
