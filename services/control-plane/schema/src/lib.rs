//! sea-orm entities owned by the control-plane service.

pub mod outbox_events;
pub mod tenants;
