use chrono::Utc;
use serde_json::json;

use keystone_control_plane::domain::types::{
    TENANT_AGGREGATE, TENANT_CREATED, TENANT_UPDATED, Tenant, TenantStatus,
};
use keystone_control_plane::error::ControlPlaneError;
use keystone_control_plane::usecase::tenant::{
    CreateTenantInput, CreateTenantUseCase, GetTenantUseCase, UpdateTenantInput,
    UpdateTenantUseCase,
};
use keystone_domain::id::TenantId;

use crate::helpers::{MockTenantRepo, ctx};

fn test_tenant() -> Tenant {
    let now = Utc::now();
    Tenant {
        id: TenantId::generate(),
        name: "Acme".into(),
        plan: "pro".into(),
        region: "eu-west-1".into(),
        status: TenantStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn should_write_tenant_created_event_with_tenant() {
    let repo = MockTenantRepo::default();
    let events = repo.events_handle();
    let uc = CreateTenantUseCase { repo };

    let tenant = uc
        .execute(
            &ctx(),
            CreateTenantInput {
                name: "Acme".into(),
                plan: "pro".into(),
                region: "eu-west-1".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(tenant.status, TenantStatus::Active);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1, "expected exactly one outbox event");
    let event = &events[0];
    assert_eq!(event.event_type, TENANT_CREATED);
    assert_eq!(event.aggregate_type, TENANT_AGGREGATE);
    assert_eq!(event.aggregate_id, tenant.id.to_string());
    assert_eq!(event.tenant_id, Some(tenant.id));
    assert_eq!(event.region_origin, "eu-west-1");
    assert_eq!(
        event.payload,
        json!({ "name": "Acme", "plan": "pro", "region": "eu-west-1" })
    );
}

#[tokio::test]
async fn should_write_tenant_updated_event_with_status() {
    let tenant = test_tenant();
    let repo = MockTenantRepo::new(vec![tenant.clone()]);
    let events = repo.events_handle();
    let uc = UpdateTenantUseCase { repo };

    let updated = uc
        .execute(
            &ctx(),
            tenant.id,
            UpdateTenantInput {
                plan: Some("enterprise".into()),
                status: Some(TenantStatus::Suspended),
                ..UpdateTenantInput::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.name, "Acme");
    assert_eq!(updated.plan, "enterprise");
    assert_eq!(updated.status, TenantStatus::Suspended);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, TENANT_UPDATED);
    assert_eq!(
        events[0].payload,
        json!({
            "name": "Acme",
            "plan": "enterprise",
            "region": "eu-west-1",
            "status": "SUSPENDED",
        })
    );
}

#[tokio::test]
async fn should_return_not_found_when_updating_unknown_tenant() {
    let repo = MockTenantRepo::default();
    let events = repo.events_handle();
    let uc = UpdateTenantUseCase { repo };

    let result = uc
        .execute(
            &ctx(),
            TenantId::generate(),
            UpdateTenantInput {
                name: Some("Globex".into()),
                ..UpdateTenantInput::default()
            },
        )
        .await;

    assert!(matches!(result, Err(ControlPlaneError::TenantNotFound)));
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_reject_blank_name_on_update() {
    let tenant = test_tenant();
    let uc = UpdateTenantUseCase {
        repo: MockTenantRepo::new(vec![tenant.clone()]),
    };

    let result = uc
        .execute(
            &ctx(),
            tenant.id,
            UpdateTenantInput {
                name: Some(" ".into()),
                ..UpdateTenantInput::default()
            },
        )
        .await;

    assert!(matches!(result, Err(ControlPlaneError::InvalidTenant)));
}

#[tokio::test]
async fn should_get_existing_tenant() {
    let tenant = test_tenant();
    let uc = GetTenantUseCase {
        repo: MockTenantRepo::new(vec![tenant.clone()]),
    };

    assert_eq!(uc.execute(tenant.id).await.unwrap(), tenant);
}
