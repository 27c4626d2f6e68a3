use deadpool_redis::Pool;
use deadpool_redis::redis;

use crate::domain::repository::EventPublisher;
use crate::domain::types::{Envelope, PublishOutcome};

/// Publishes envelopes by appending them to a Redis stream.
///
/// The stream name plays the role of the exchange; the routing key travels as
/// an entry field so consumers can filter on it.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    pub pool: Pool,
    pub exchange: String,
    pub routing_key_prefix: String,
    /// Approximate stream length kept by `XADD MAXLEN ~`; `None` leaves the stream uncapped.
    pub max_len: Option<u64>,
}

impl RedisStreamPublisher {
    /// Field/value pairs of the stream entry for `envelope`.
    fn entry_fields(
        &self,
        envelope: &Envelope,
    ) -> Result<[(&'static str, String); 3], serde_json::Error> {
        Ok([
            ("routing_key", envelope.routing_key(&self.routing_key_prefix)),
            ("event_id", envelope.id.to_string()),
            ("envelope", serde_json::to_string(envelope)?),
        ])
    }

    /// `XADD` arguments before the entry fields.
    fn stream_args(&self) -> Vec<String> {
        let mut args = vec![self.exchange.clone()];
        if let Some(max_len) = self.max_len {
            args.extend(["MAXLEN".to_owned(), "~".to_owned(), max_len.to_string()]);
        }
        args.push("*".to_owned());
        args
    }

    async fn append(&self, envelope: &Envelope) -> anyhow::Result<String> {
        let fields = self.entry_fields(envelope)?;
        let mut conn = self.pool.get().await?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(self.stream_args());
        for (field, value) in &fields {
            cmd.arg(*field).arg(value);
        }
        let entry_id: String = cmd.query_async(&mut conn).await?;
        Ok(entry_id)
    }
}

impl EventPublisher for RedisStreamPublisher {
    async fn publish(&self, envelope: &Envelope) -> PublishOutcome {
        match self.append(envelope).await {
            Ok(entry_id) => {
                tracing::debug!(
                    event_id = %envelope.id,
                    stream = %self.exchange,
                    entry_id = %entry_id,
                    "event appended to stream"
                );
                PublishOutcome::Delivered
            }
            Err(e) => PublishOutcome::NotDelivered(format!("{e:#}")),
        }
    }
}
