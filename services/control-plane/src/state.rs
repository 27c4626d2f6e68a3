use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::infra::db::{DbOutboxRepository, DbTenantRepository};
use crate::usecase::dispatch::DispatchMetrics;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    /// Counters of the dispatcher running in this process (all zero when disabled).
    pub metrics: Arc<DispatchMetrics>,
}

impl AppState {
    pub fn tenant_repo(&self) -> DbTenantRepository {
        DbTenantRepository {
            db: self.db.clone(),
        }
    }

    pub fn outbox_repo(&self) -> DbOutboxRepository {
        DbOutboxRepository {
            db: self.db.clone(),
        }
    }
}
