//! Shared service plumbing for Keystone: tracing setup, clock port, ops
//! health handler, correlation-id middleware and serde helpers.

pub mod clock;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
