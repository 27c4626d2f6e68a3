//! Tenant producer use cases, driven by the transport layer that owns the request context.

use chrono::Utc;
use serde_json::json;

use keystone_domain::context::RequestContext;
use keystone_domain::id::TenantId;

use crate::domain::repository::TenantRepository;
use crate::domain::types::{
    NewOutboxEvent, TENANT_AGGREGATE, TENANT_CREATED, TENANT_UPDATED, Tenant, TenantStatus,
};
use crate::error::ControlPlaneError;

fn tenant_event(ctx: &RequestContext, tenant: &Tenant, event_type: &str) -> NewOutboxEvent {
    let mut payload = json!({
        "name": tenant.name,
        "plan": tenant.plan,
        "region": tenant.region,
    });
    if event_type == TENANT_UPDATED {
        payload["status"] = json!(tenant.status.as_str());
    }
    NewOutboxEvent::new(
        ctx,
        Some(tenant.id),
        TENANT_AGGREGATE,
        tenant.id.to_string(),
        event_type,
        payload,
    )
}

// ── CreateTenant ─────────────────────────────────────────────────────────────

pub struct CreateTenantInput {
    pub name: String,
    pub plan: String,
    pub region: String,
}

pub struct CreateTenantUseCase<R: TenantRepository> {
    pub repo: R,
}

impl<R: TenantRepository> CreateTenantUseCase<R> {
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        input: CreateTenantInput,
    ) -> Result<Tenant, ControlPlaneError> {
        if input.name.trim().is_empty() {
            return Err(ControlPlaneError::InvalidTenant);
        }
        let now = Utc::now();
        let tenant = Tenant {
            id: TenantId::generate(),
            name: input.name,
            plan: input.plan,
            region: input.region,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let event = tenant_event(ctx, &tenant, TENANT_CREATED);

        self.repo.create_with_outbox(&tenant, &event).await?;
        tracing::info!(
            tenant_id = %tenant.id,
            event_id = %event.id,
            correlation_id = ctx.correlation_id.as_deref(),
            "tenant created"
        );
        Ok(tenant)
    }
}

// ── GetTenant ────────────────────────────────────────────────────────────────

pub struct GetTenantUseCase<R: TenantRepository> {
    pub repo: R,
}

impl<R: TenantRepository> GetTenantUseCase<R> {
    pub async fn execute(&self, id: TenantId) -> Result<Tenant, ControlPlaneError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(ControlPlaneError::TenantNotFound)
    }
}

// ── UpdateTenant ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct UpdateTenantInput {
    pub name: Option<String>,
    pub plan: Option<String>,
    pub region: Option<String>,
    pub status: Option<TenantStatus>,
}

impl UpdateTenantInput {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.plan.is_none() && self.region.is_none() && self.status.is_none()
    }
}

pub struct UpdateTenantUseCase<R: TenantRepository> {
    pub repo: R,
}

impl<R: TenantRepository> UpdateTenantUseCase<R> {
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        id: TenantId,
        input: UpdateTenantInput,
    ) -> Result<Tenant, ControlPlaneError> {
        if input.is_empty() {
            return Err(ControlPlaneError::MissingData);
        }
        if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ControlPlaneError::InvalidTenant);
        }

        let mut tenant = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(ControlPlaneError::TenantNotFound)?;
        if let Some(name) = input.name {
            tenant.name = name;
        }
        if let Some(plan) = input.plan {
            tenant.plan = plan;
        }
        if let Some(region) = input.region {
            tenant.region = region;
        }
        if let Some(status) = input.status {
            tenant.status = status;
        }
        tenant.updated_at = Utc::now();

        let event = tenant_event(ctx, &tenant, TENANT_UPDATED);
        // Deleted between the read and the write.
        if !self.repo.update_with_outbox(&tenant, &event).await? {
            return Err(ControlPlaneError::TenantNotFound);
        }
        tracing::info!(
            tenant_id = %tenant.id,
            event_id = %event.id,
            correlation_id = ctx.correlation_id.as_deref(),
            "tenant updated"
        );
        Ok(tenant)
    }
}
