use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Condition, Expr};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

use keystone_control_plane_schema::{outbox_events, tenants};
use keystone_domain::id::{OutboxEventId, TenantId};

use crate::domain::repository::{OutboxLeaseManager, OutboxRepository, TenantRepository};
use crate::domain::retry::{FailureDecision, RetryPolicy};
use crate::domain::types::{
    NewOutboxEvent, OutboxEvent, OutboxStatus, Tenant, TenantStatus, lease_cutoff,
};
use crate::error::ControlPlaneError;

// ── Tenant repository ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbTenantRepository {
    pub db: DatabaseConnection,
}

impl TenantRepository for DbTenantRepository {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, ControlPlaneError> {
        let model = tenants::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find tenant by id")?;
        model
            .map(tenant_from_model)
            .transpose()
            .map_err(ControlPlaneError::Internal)
    }

    async fn create_with_outbox(
        &self,
        tenant: &Tenant,
        event: &NewOutboxEvent,
    ) -> Result<(), ControlPlaneError> {
        self.db
            .transaction::<_, (), sea_orm::DbErr>(|txn| {
                let tenant = tenant.clone();
                let event = event.clone();
                Box::pin(async move {
                    tenant_active_model(&tenant).insert(txn).await?;
                    enqueue_outbox_event(txn, &event, tenant.updated_at).await?;
                    Ok(())
                })
            })
            .await
            .context("create tenant with outbox")?;
        Ok(())
    }

    async fn update_with_outbox(
        &self,
        tenant: &Tenant,
        event: &NewOutboxEvent,
    ) -> Result<bool, ControlPlaneError> {
        let updated = self
            .db
            .transaction::<_, bool, sea_orm::DbErr>(|txn| {
                let tenant = tenant.clone();
                let event = event.clone();
                Box::pin(async move {
                    let result = tenants::Entity::update_many()
                        .col_expr(tenants::Column::Name, Expr::value(tenant.name.clone()))
                        .col_expr(tenants::Column::Plan, Expr::value(tenant.plan.clone()))
                        .col_expr(tenants::Column::Region, Expr::value(tenant.region.clone()))
                        .col_expr(tenants::Column::Status, Expr::value(tenant.status.as_str()))
                        .col_expr(tenants::Column::UpdatedAt, Expr::value(tenant.updated_at))
                        .filter(tenants::Column::Id.eq(tenant.id.0))
                        .exec(txn)
                        .await?;
                    if result.rows_affected == 0 {
                        return Ok(false);
                    }
                    enqueue_outbox_event(txn, &event, tenant.updated_at).await?;
                    Ok(true)
                })
            })
            .await
            .context("update tenant with outbox")?;
        Ok(updated)
    }
}

fn tenant_active_model(tenant: &Tenant) -> tenants::ActiveModel {
    tenants::ActiveModel {
        id: Set(tenant.id.0),
        name: Set(tenant.name.clone()),
        plan: Set(tenant.plan.clone()),
        region: Set(tenant.region.clone()),
        status: Set(tenant.status.as_str().to_owned()),
        created_at: Set(tenant.created_at),
        updated_at: Set(tenant.updated_at),
    }
}

fn tenant_from_model(model: tenants::Model) -> anyhow::Result<Tenant> {
    let status: TenantStatus = model.status.parse().context("decode tenant status")?;
    Ok(Tenant {
        id: TenantId(model.id),
        name: model.name,
        plan: model.plan,
        region: model.region,
        status,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Outbox store ──────────────────────────────────────────────────────────────

/// Insert a `PENDING` outbox row on `conn`.
///
/// Pass the producer's open transaction so the event commits or rolls back
/// together with the business change.
pub async fn enqueue_outbox_event<C: ConnectionTrait>(
    conn: &C,
    event: &NewOutboxEvent,
    now: DateTime<Utc>,
) -> Result<(), sea_orm::DbErr> {
    outbox_events::ActiveModel {
        id: Set(event.id.0),
        tenant_id: Set(event.tenant_id.map(|t| t.0)),
        region_origin: Set(event.region_origin.clone()),
        aggregate_type: Set(event.aggregate_type.clone()),
        aggregate_id: Set(event.aggregate_id.clone()),
        event_type: Set(event.event_type.clone()),
        payload: Set(event.payload.clone()),
        status: Set(OutboxStatus::Pending.as_str().to_owned()),
        retries: Set(0),
        locked_at: Set(None),
        locked_by: Set(None),
        created_at: Set(now),
        sent_at: Set(None),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Outbox store and lease manager over one connection pool.
#[derive(Clone)]
pub struct DbOutboxRepository {
    pub db: DatabaseConnection,
}

/// Unlocked, or leased before `cutoff`.
fn lease_free(cutoff: DateTime<Utc>) -> Condition {
    Condition::any()
        .add(outbox_events::Column::LockedAt.is_null())
        .add(outbox_events::Column::LockedAt.lt(cutoff))
}

impl OutboxRepository for DbOutboxRepository {
    async fn list_dispatch_candidates(
        &self,
        now: DateTime<Utc>,
        lock_expiry: Duration,
        batch_size: u64,
    ) -> Result<Vec<OutboxEvent>, ControlPlaneError> {
        let models = outbox_events::Entity::find()
            .filter(outbox_events::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(lease_free(lease_cutoff(now, lock_expiry)))
            .order_by_asc(outbox_events::Column::CreatedAt)
            .order_by_asc(outbox_events::Column::Id)
            .limit(batch_size)
            .all(&self.db)
            .await
            .context("list outbox dispatch candidates")?;
        models
            .into_iter()
            .map(outbox_event_from_model)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(ControlPlaneError::Internal)
    }

    async fn find_by_id(
        &self,
        id: OutboxEventId,
    ) -> Result<Option<OutboxEvent>, ControlPlaneError> {
        let model = outbox_events::Entity::find_by_id(id.0)
            .one(&self.db)
            .await
            .context("find outbox event by id")?;
        model
            .map(outbox_event_from_model)
            .transpose()
            .map_err(ControlPlaneError::Internal)
    }
}

impl OutboxLeaseManager for DbOutboxRepository {
    async fn claim(
        &self,
        id: OutboxEventId,
        owner: &str,
        now: DateTime<Utc>,
        lock_expiry: Duration,
    ) -> Result<bool, ControlPlaneError> {
        let result = outbox_events::Entity::update_many()
            .col_expr(outbox_events::Column::LockedAt, Expr::value(now))
            .col_expr(outbox_events::Column::LockedBy, Expr::value(owner))
            .filter(outbox_events::Column::Id.eq(id.0))
            .filter(outbox_events::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .filter(lease_free(lease_cutoff(now, lock_expiry)))
            .exec(&self.db)
            .await
            .context("claim outbox event")?;
        Ok(result.rows_affected == 1)
    }

    async fn mark_sent(
        &self,
        id: OutboxEventId,
        now: DateTime<Utc>,
    ) -> Result<bool, ControlPlaneError> {
        let result = outbox_events::Entity::update_many()
            .col_expr(
                outbox_events::Column::Status,
                Expr::value(OutboxStatus::Sent.as_str()),
            )
            .col_expr(outbox_events::Column::SentAt, Expr::value(Some(now)))
            .col_expr(
                outbox_events::Column::LockedAt,
                Expr::value(None::<DateTime<Utc>>),
            )
            .col_expr(outbox_events::Column::LockedBy, Expr::value(None::<String>))
            .filter(outbox_events::Column::Id.eq(id.0))
            .filter(outbox_events::Column::Status.eq(OutboxStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .context("mark outbox event sent")?;
        Ok(result.rows_affected == 1)
    }

    async fn handle_failure(
        &self,
        id: OutboxEventId,
        owner: &str,
        policy: &RetryPolicy,
    ) -> Result<Option<FailureDecision>, ControlPlaneError> {
        let decision = self
            .db
            .transaction::<_, Option<FailureDecision>, sea_orm::DbErr>(|txn| {
                let owner = owner.to_owned();
                let policy = *policy;
                Box::pin(async move {
                    let Some(row) = outbox_events::Entity::find_by_id(id.0).one(txn).await? else {
                        return Ok(None);
                    };
                    if row.status != OutboxStatus::Pending.as_str()
                        || row.locked_by.as_deref() != Some(owner.as_str())
                    {
                        return Ok(None);
                    }

                    let retries_so_far = u32::try_from(row.retries).map_err(|e| {
                        sea_orm::DbErr::Custom(format!("decode outbox retries: {e}"))
                    })?;
                    let decision = policy.on_failure(retries_so_far);
                    let status = match decision {
                        FailureDecision::Requeue { .. } => OutboxStatus::Pending,
                        FailureDecision::Fail { .. } => OutboxStatus::Failed,
                    };
                    let retries = i32::try_from(decision.retries()).map_err(|e| {
                        sea_orm::DbErr::Custom(format!("encode outbox retries: {e}"))
                    })?;

                    // Guarded by the observed retries so a concurrent settlement cannot be
                    // double-counted.
                    let result = outbox_events::Entity::update_many()
                        .col_expr(outbox_events::Column::Status, Expr::value(status.as_str()))
                        .col_expr(outbox_events::Column::Retries, Expr::value(retries))
                        .col_expr(
                            outbox_events::Column::LockedAt,
                            Expr::value(None::<DateTime<Utc>>),
                        )
                        .col_expr(outbox_events::Column::LockedBy, Expr::value(None::<String>))
                        .filter(outbox_events::Column::Id.eq(id.0))
                        .filter(outbox_events::Column::Status.eq(OutboxStatus::Pending.as_str()))
                        .filter(outbox_events::Column::LockedBy.eq(owner.as_str()))
                        .filter(outbox_events::Column::Retries.eq(row.retries))
                        .exec(txn)
                        .await?;
                    Ok((result.rows_affected == 1).then_some(decision))
                })
            })
            .await
            .context("handle outbox failure")?;
        Ok(decision)
    }
}

fn outbox_event_from_model(model: outbox_events::Model) -> anyhow::Result<OutboxEvent> {
    let status: OutboxStatus = model.status.parse().context("decode outbox status")?;
    let retries = u32::try_from(model.retries).context("decode outbox retries")?;
    Ok(OutboxEvent {
        id: OutboxEventId(model.id),
        tenant_id: model.tenant_id.map(TenantId),
        region_origin: model.region_origin,
        aggregate_type: model.aggregate_type,
        aggregate_id: model.aggregate_id,
        event_type: model.event_type,
        payload: model.payload,
        status,
        retries,
        locked_at: model.locked_at,
        locked_by: model.locked_by,
        created_at: model.created_at,
        sent_at: model.sent_at,
    })
}
