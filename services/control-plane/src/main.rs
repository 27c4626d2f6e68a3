use std::sync::Arc;

use sea_orm::Database;
use tokio::sync::watch;
use tracing::{info, warn};

use keystone_control_plane::config::ControlPlaneConfig;
use keystone_control_plane::infra::bus::RedisStreamPublisher;
use keystone_control_plane::router::build_router;
use keystone_control_plane::state::AppState;
use keystone_control_plane::usecase::dispatch::{DispatchMetrics, OutboxDispatcher};
use keystone_core::clock::SystemClock;
use keystone_core::tracing::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = ControlPlaneConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .expect("failed to create Redis pool");

    let state = AppState {
        db,
        metrics: Arc::new(DispatchMetrics::default()),
    };

    // Dispatcher
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = if config.outbox.publish_enabled {
        if config.outbox.publish_timeout_exceeds_lease() {
            warn!(
                publish_timeout_ms = config.outbox.publish_timeout_ms,
                lock_ttl_seconds = config.outbox.lock_ttl_seconds,
                "publish timeout is not shorter than the lease; events may be published twice"
            );
        }
        let dispatcher = OutboxDispatcher {
            store: state.outbox_repo(),
            publisher: RedisStreamPublisher {
                pool: redis,
                exchange: config.outbox.exchange.clone(),
                routing_key_prefix: config.outbox.routing_key_prefix.clone(),
                max_len: config.outbox.stream_max_len(),
            },
            clock: SystemClock,
            settings: config.outbox.dispatch_settings(),
            instance_id: config.outbox.instance_id.clone(),
            metrics: Arc::clone(&state.metrics),
        };
        Some(tokio::spawn(dispatcher.run(shutdown_rx)))
    } else {
        info!("outbox publishing disabled in this process");
        None
    };

    // Ops HTTP server
    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.ops_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!(region = %config.region, "control-plane ops listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // The dispatcher finishes its current batch before it stops.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = dispatcher {
        if let Err(e) = handle.await {
            warn!(error = %e, "outbox dispatcher task ended abnormally");
        }
    }
    info!("control-plane stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
