use axum::{Json, extract::State, http::StatusCode};

use crate::state::AppState;
use crate::usecase::dispatch::DispatchMetricsSnapshot;

/// Handler for `GET /readyz`: ready once the database answers a ping.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    match state.db.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn outbox_metrics(State(state): State<AppState>) -> Json<DispatchMetricsSnapshot> {
    Json(state.metrics.snapshot())
}
