//! Request-scoped context passed explicitly through producer call paths.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("region must not be blank")]
    BlankRegion,
}

/// Cross-cutting request state (origin region, correlation id).
///
/// Built once at the edge of a request or job and handed by reference to every
/// use case that needs it. Nothing reads it from thread-local or global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Region (or instance group) handling the request. Stamped onto outbox events.
    pub region: String,
    pub correlation_id: Option<String>,
}

impl RequestContext {
    pub fn new(region: impl Into<String>) -> Result<Self, ContextError> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(ContextError::BlankRegion);
        }
        Ok(Self {
            region,
            correlation_id: None,
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
