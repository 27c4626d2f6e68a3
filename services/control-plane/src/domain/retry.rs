/// Bounded retry accounting for outbox delivery.
///
/// Failures are counted, never delayed: a requeued event is eligible again on
/// the next tick once its lease is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_max: u32,
}

/// What a failed attempt does to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Back to `PENDING` with the lease cleared.
    Requeue { retries: u32 },
    /// Terminal `FAILED`.
    Fail { retries: u32 },
}

impl FailureDecision {
    pub fn retries(&self) -> u32 {
        match *self {
            Self::Requeue { retries } | Self::Fail { retries } => retries,
        }
    }
}

impl RetryPolicy {
    /// Decide the outcome of one more failure given the failures already recorded.
    ///
    /// With `retry_max = 0` the first failure is terminal.
    pub fn on_failure(&self, retries_so_far: u32) -> FailureDecision {
        let retries = retries_so_far.saturating_add(1);
        if retries >= self.retry_max {
            FailureDecision::Fail { retries }
        } else {
            FailureDecision::Requeue { retries }
        }
    }
}
