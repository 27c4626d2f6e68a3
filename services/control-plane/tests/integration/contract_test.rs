use chrono::{TimeZone, Utc};
use serde_json::json;

use keystone_control_plane::domain::types::{
    Envelope, OutboxEvent, OutboxStatus, TENANT_AGGREGATE, TENANT_CREATED,
};
use keystone_domain::id::{OutboxEventId, TenantId};
use keystone_testing::fixture::Fixture;

#[test]
fn should_match_tenant_created_golden_envelope() {
    let tenant_id: TenantId = "01954f3a-6c00-7000-8000-0000000000b7".parse().unwrap();
    let event = OutboxEvent {
        id: "01954f3a-6c00-7000-8000-00000000a11c"
            .parse::<OutboxEventId>()
            .unwrap(),
        tenant_id: Some(tenant_id),
        region_origin: "eu-west-1".to_owned(),
        aggregate_type: TENANT_AGGREGATE.to_owned(),
        aggregate_id: tenant_id.to_string(),
        event_type: TENANT_CREATED.to_owned(),
        payload: json!({ "name": "Acme", "plan": "pro", "region": "eu-west-1" }),
        status: OutboxStatus::Pending,
        retries: 0,
        locked_at: None,
        locked_by: None,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        sent_at: None,
    };

    let actual = serde_json::to_value(Envelope::from(&event)).unwrap();

    assert_eq!(actual, Fixture::load("contracts/events/tenant_created.json"));
}
