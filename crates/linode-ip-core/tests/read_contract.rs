//! Contract Test: Refresh
//!
//! Constraints verified:
//! - A missing address means the resource is removed, not an error
//! - Derived fields are overwritten by the API
//! - Assignment drift is reported as a warning and not healed
//!
//! If this test fails, state refresh is broken.

mod common;

use common::*;
use linode_ip_core::{
    Assignment, IpResourceConfig, OperationContext, ReadOutcome, ReconcileEvent, Severity,
};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn read_of_deleted_resource_is_removed() {
    let api = MockLinodeApi::new();
    let (reconciler, events) = reconciler(&api);
    let ctx = OperationContext::background();

    let state = assert_ok!(reconciler.create(&ctx, &IpResourceConfig::instance(123)).await);
    api.forget(&state.address);

    let outcome = assert_ok!(reconciler.read(&ctx, &state).await);
    assert_eq!(outcome, ReadOutcome::Removed);

    drop(reconciler);
    let events = drain_events(events).await;
    assert!(events.contains(&ReconcileEvent::Removed {
        address: state.address.clone()
    }));
}

#[tokio::test]
async fn read_overwrites_derived_fields() {
    let api = MockLinodeApi::new();
    let (reconciler, _events) = reconciler(&api);
    let ctx = OperationContext::background();

    let state = assert_ok!(reconciler.create(&ctx, &IpResourceConfig::reserved_in("us-east")).await);

    let mut changed = api.remote(&state.address).unwrap();
    changed.rdns = Some("changed.example.com".to_string());
    changed.gateway = None;
    api.seed(changed);

    let ReadOutcome::Present { state: read, .. } = assert_ok!(reconciler.read(&ctx, &state).await)
    else {
        panic!("resource should exist");
    };
    assert_eq!(read.rdns.as_deref(), Some("changed.example.com"));
    assert_eq!(read.gateway, None);
    assert_eq!(read.kind, state.kind);
}

#[tokio::test]
async fn read_propagates_other_errors() {
    let api = MockLinodeApi::new();
    let (reconciler, _events) = reconciler(&api);
    let ctx = OperationContext::background();

    let state = assert_ok!(reconciler.create(&ctx, &IpResourceConfig::instance(123)).await);
    api.fail("get_ip_address", 503, "service unavailable");

    let err = assert_err!(reconciler.read(&ctx, &state).await);
    assert_eq!(err.code(), Some(503));
    assert!(err.to_string().contains(&state.address));
}

#[tokio::test]
async fn assignment_drift_warns_without_healing() {
    let api = MockLinodeApi::new();
    api.seed(ipv4_record("192.0.2.50", None));
    api.seed(ipv4_record("192.0.2.51", None));
    let (reconciler, events) = reconciler(&api);
    let ctx = OperationContext::background();

    let desired = IpResourceConfig::assign(
        "us-east",
        vec![
            Assignment::new("192.0.2.50", 1),
            Assignment::new("192.0.2.51", 2),
        ],
    );
    let state = assert_ok!(reconciler.create(&ctx, &desired).await);

    api.rebind("192.0.2.51", Some(9));
    let calls_before = api.call_count();

    let ReadOutcome::Present { state: read, diagnostics } =
        assert_ok!(reconciler.read(&ctx, &state).await)
    else {
        panic!("resource should exist");
    };

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        diagnostics[0].attribute.as_deref(),
        Some("assignments[1].linode_id")
    );

    // tracked identity and assignments are untouched
    assert_eq!(read.assignments, state.assignments);
    assert_eq!(read.linode_id, Some(1));

    // only reads, no corrective assignment
    assert_eq!(api.call_count() - calls_before, 2);
    assert_eq!(api.calls_to("assign_ips"), 1);
    assert_eq!(api.remote("192.0.2.51").unwrap().linode_id, Some(9));

    drop(reconciler);
    let events = drain_events(events).await;
    assert!(events.contains(&ReconcileEvent::DriftDetected {
        address: "192.0.2.51".to_string(),
        expected_linode_id: 2,
        actual_linode_id: Some(9),
    }));
}

#[tokio::test]
async fn missing_assigned_address_removes_resource() {
    let api = MockLinodeApi::new();
    api.seed(ipv4_record("192.0.2.50", None));
    api.seed(ipv4_record("192.0.2.51", None));
    let (reconciler, _events) = reconciler(&api);
    let ctx = OperationContext::background();

    let desired = IpResourceConfig::assign(
        "us-east",
        vec![
            Assignment::new("192.0.2.50", 1),
            Assignment::new("192.0.2.51", 2),
        ],
    );
    let state = assert_ok!(reconciler.create(&ctx, &desired).await);
    api.forget("192.0.2.51");

    let outcome = assert_ok!(reconciler.read(&ctx, &state).await);
    assert_eq!(outcome, ReadOutcome::Removed);
}
