use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::retry::RetryPolicy;
use crate::usecase::dispatch::DispatchSettings;

/// Control-plane service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL (message bus). Env var: `REDIS_URL`.
    pub redis_url: String,
    /// Region stamped onto produced events (default "local"). Env var: `APP_REGION`.
    pub region: String,
    /// TCP port for the ops HTTP server (default 3120). Env var: `OPS_PORT`.
    pub ops_port: u16,
    pub outbox: OutboxConfig,
}

/// Outbox dispatcher knobs. All env vars are prefixed `OUTBOX_`.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Run the dispatcher in this process (default true). Env var: `OUTBOX_PUBLISH_ENABLED`.
    pub publish_enabled: bool,
    /// Max rows per tick (default 50). Bounds throughput and claim contention.
    pub batch_size: u64,
    /// Delay between ticks in ms (default 5000). Env var: `OUTBOX_DISPATCH_INTERVAL_MS`.
    pub dispatch_interval_ms: u64,
    /// Lease expiry in seconds (default 60). Env var: `OUTBOX_LOCK_TTL_SECONDS`.
    pub lock_ttl_seconds: u64,
    /// Failed attempts before an event is marked FAILED (default 5). Env var: `OUTBOX_RETRY_MAX`.
    pub retry_max: u32,
    /// Upper bound for one publish call in ms (default 5000). Env var: `OUTBOX_PUBLISH_TIMEOUT_MS`.
    pub publish_timeout_ms: u64,
    /// Bus stream events are appended to (default "saas.events"). Env var: `OUTBOX_EXCHANGE`.
    pub exchange: String,
    /// First segment of every routing key (default "saas"). Env var: `OUTBOX_ROUTING_KEY_PREFIX`.
    pub routing_key_prefix: String,
    /// Approximate cap on the bus stream length (default 100000, 0 disables). Env var: `OUTBOX_STREAM_MAXLEN`.
    pub stream_max_len: u64,
    /// Lease owner id for this process. Env var: `OUTBOX_INSTANCE_ID`, else `<region>-<8 hex>`.
    pub instance_id: String,
}

impl ControlPlaneConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    ///
    /// # Panics
    ///
    /// Panics if `DATABASE_URL` or `REDIS_URL` is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let region = lookup("APP_REGION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "local".to_owned());
        let instance_id = lookup("OUTBOX_INSTANCE_ID")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_instance_id(&region));

        Self {
            database_url: lookup("DATABASE_URL").expect("DATABASE_URL"),
            redis_url: lookup("REDIS_URL").expect("REDIS_URL"),
            ops_port: parse_or(&lookup, "OPS_PORT", 3120),
            outbox: OutboxConfig {
                publish_enabled: parse_or(&lookup, "OUTBOX_PUBLISH_ENABLED", true),
                batch_size: parse_or(&lookup, "OUTBOX_BATCH_SIZE", 50),
                dispatch_interval_ms: parse_or(&lookup, "OUTBOX_DISPATCH_INTERVAL_MS", 5000),
                lock_ttl_seconds: parse_or(&lookup, "OUTBOX_LOCK_TTL_SECONDS", 60),
                retry_max: parse_or(&lookup, "OUTBOX_RETRY_MAX", 5),
                publish_timeout_ms: parse_or(&lookup, "OUTBOX_PUBLISH_TIMEOUT_MS", 5000),
                exchange: lookup("OUTBOX_EXCHANGE").unwrap_or_else(|| "saas.events".to_owned()),
                routing_key_prefix: lookup("OUTBOX_ROUTING_KEY_PREFIX")
                    .unwrap_or_else(|| "saas".to_owned()),
                stream_max_len: parse_or(&lookup, "OUTBOX_STREAM_MAXLEN", 100_000),
                instance_id,
            },
            region,
        }
    }
}

impl OutboxConfig {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_size: self.batch_size.max(1),
            tick_interval: Duration::from_millis(self.dispatch_interval_ms.max(1)),
            lock_expiry: Duration::from_secs(self.lock_ttl_seconds),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            retry: RetryPolicy {
                retry_max: self.retry_max,
            },
        }
    }

    pub fn stream_max_len(&self) -> Option<u64> {
        (self.stream_max_len > 0).then_some(self.stream_max_len)
    }

    /// A publish that outlives the lease lets a second instance claim the row mid-flight.
    pub fn publish_timeout_exceeds_lease(&self) -> bool {
        self.publish_timeout_ms >= self.lock_ttl_seconds.saturating_mul(1000)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn default_instance_id(region: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{region}-{}", &suffix[..8])
}
