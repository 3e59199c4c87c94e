// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant scoping, lease admission, and selector compatibility.

use super::*;

fn tenant_request(state: &DaemonState, command: &str, tenant: Option<&str>) -> Request {
    let mut req = request(state, command).with_flag("sessionIsolation", json!("tenant"));
    if let Some(tenant) = tenant {
        req = req.with_flag("tenant", json!(tenant));
    }
    req
}

#[tokio::test]
async fn tenant_isolation_without_tenant_id_is_invalid() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, tenant_request(&state, "session_list", None)).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}

#[tokio::test]
async fn invalid_tenant_id_is_rejected() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, tenant_request(&state, "session_list", Some("a b"))).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}

#[tokio::test]
async fn session_list_is_lease_exempt() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, tenant_request(&state, "session_list", Some("acme"))).await;
    assert!(resp.ok, "{:?}", resp.error);
}

#[tokio::test]
async fn tenant_command_without_lease_is_invalid() {
    let (state, _dir) = test_state(FakeBackend::new());
    let mut req = tenant_request(&state, "close", Some("acme"));
    req = req.with_flag("runId", json!("run-1"));
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}

#[tokio::test]
async fn lease_admission_then_session_not_found() {
    let (state, _dir) = test_state(FakeBackend::new());

    // Allocate a lease through the pipeline
    let alloc = request(&state, "lease_allocate")
        .with_flag("tenantId", json!("acme"))
        .with_flag("runId", json!("run-1"))
        .with_flag("ttlMs", json!(60_000));
    let resp = send(&state, alloc).await;
    assert!(resp.ok, "{:?}", resp.error);
    let lease_id = resp.data.unwrap()["lease"]["leaseId"]
        .as_str()
        .unwrap()
        .to_string();

    // Admission passes; the command then fails on the missing session
    let mut req = tenant_request(&state, "close", Some("acme"));
    req = req
        .with_flag("runId", json!("run-1"))
        .with_flag("leaseId", json!(lease_id.clone()));
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::SessionNotFound));

    // Released lease no longer admits
    let release = request(&state, "lease_release").with_flag("leaseId", json!(lease_id.clone()));
    let resp = send(&state, release).await;
    assert_eq!(resp.data.unwrap()["released"], json!(true));

    let mut req = tenant_request(&state, "close", Some("acme"));
    req = req
        .with_flag("runId", json!("run-1"))
        .with_flag("leaseId", json!(lease_id));
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn lease_release_is_idempotent_through_pipeline() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(
        &state,
        request(&state, "lease_release").with_flag("leaseId", json!("feedface00000000")),
    )
    .await;
    assert!(resp.ok);
    assert_eq!(resp.data.unwrap()["released"], json!(false));
}

#[tokio::test]
async fn tenant_sessions_are_namespaced() {
    let (state, _dir) = test_state(FakeBackend::new());

    let alloc = request(&state, "lease_allocate")
        .with_flag("tenantId", json!("acme"))
        .with_flag("runId", json!("run-1"));
    let resp = send(&state, alloc).await;
    let lease_id = resp.data.unwrap()["lease"]["leaseId"]
        .as_str()
        .unwrap()
        .to_string();

    let mut open = tenant_request(&state, "open", Some("acme"));
    open = open
        .with_flag("runId", json!("run-1"))
        .with_flag("leaseId", json!(lease_id))
        .with_args(vec!["Settings".into()]);
    let resp = send(&state, open).await;
    assert!(resp.ok, "{:?}", resp.error);

    // The stored session carries the tenant prefix
    assert!(state.sessions.get("acme:default").is_some());
    assert!(state.sessions.get("default").is_none());
}

#[tokio::test]
async fn selector_conflict_never_reaches_dispatch() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;
    let dispatched_before = backend.commands_run().len();

    let req = request(&state, "press")
        .with_args(vec!["Login".into()])
        .with_flag("udid", json!("DIFFERENT-DEVICE"));
    let resp = send(&state, req).await;

    let err = resp.error.unwrap();
    assert_eq!(err.code, ErrorCode::InvalidArgs);
    assert_eq!(err.details.unwrap()["conflicts"], json!(["udid"]));
    assert_eq!(backend.commands_run().len(), dispatched_before);
}

#[tokio::test]
async fn matching_selector_passes_compatibility() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;

    let req = request(&state, "press")
        .with_args(vec!["Login".into()])
        .with_flag("udid", json!("FAKE-UDID-1"))
        .with_flag("platform", json!("apple"));
    let resp = send(&state, req).await;
    assert!(resp.ok, "{:?}", resp.error);
}
