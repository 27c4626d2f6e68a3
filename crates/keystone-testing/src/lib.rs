//! Test utilities for Keystone services.
//!
//! Provides a controllable `ManualClock` and the golden-fixture loader.
//! Import from `[dev-dependencies]` only — never in production code.

pub mod clock;
pub mod fixture;
