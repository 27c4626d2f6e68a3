use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use keystone_core::health::healthz;
use keystone_core::middleware::{correlation_id_layer, propagate_correlation_id_layer};

use crate::handlers::ops::{outbox_metrics, readyz};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Outbox
        .route("/outbox/metrics", get(outbox_metrics))
        .layer(propagate_correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
