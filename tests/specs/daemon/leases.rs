//! Lease lifecycle specs over the HTTP surface.

use crate::prelude::*;
use serde_json::json;

#[test]
fn lease_full_flow() {
    let daemon = Daemon::launch("http");
    let token = daemon.token();

    // Allocate
    let (status, value) = rpc(
        &daemon,
        "agent_device.lease.allocate",
        json!({"tenantId": "acme", "runId": "run-1", "ttlMs": 60000, "token": token}),
    );
    assert_eq!(status, 200, "{value}");
    let lease = &value["result"]["data"]["lease"];
    assert_eq!(lease["tenantId"], "acme");
    assert_eq!(lease["runId"], "run-1");
    assert_eq!(lease["backend"], "ios-simulator");
    let lease_id = lease["leaseId"].as_str().unwrap().to_string();
    assert_eq!(lease_id.len(), 32);

    // Allocation is idempotent per (tenant, run, backend)
    let (_, value) = rpc(
        &daemon,
        "agent_device.lease.allocate",
        json!({"tenantId": "acme", "runId": "run-1", "token": token}),
    );
    assert_eq!(
        value["result"]["data"]["lease"]["leaseId"].as_str().unwrap(),
        lease_id
    );

    // Tenant-isolated command without a leaseId: rejected up front
    let (status, value) = rpc(
        &daemon,
        "agent_device.command",
        json!({
            "command": "close",
            "token": token,
            "session": "default",
            "flags": {"sessionIsolation": "tenant", "tenant": "acme", "runId": "run-1"},
        }),
    );
    assert_eq!(status, 400, "{value}");
    assert_eq!(value["error"]["data"]["code"], "INVALID_ARGS");

    // With the lease: admission passes, then no session exists
    let (status, value) = rpc(
        &daemon,
        "agent_device.command",
        json!({
            "command": "close",
            "token": token,
            "session": "default",
            "flags": {
                "sessionIsolation": "tenant",
                "tenant": "acme",
                "runId": "run-1",
                "leaseId": lease_id,
            },
        }),
    );
    assert_eq!(status, 404, "{value}");
    assert_eq!(value["error"]["data"]["code"], "SESSION_NOT_FOUND");

    // Heartbeat refreshes
    let (status, value) = rpc(
        &daemon,
        "agent_device.lease.heartbeat",
        json!({"leaseId": lease_id, "ttlMs": 60000, "token": token}),
    );
    assert_eq!(status, 200, "{value}");
    assert_eq!(
        value["result"]["data"]["lease"]["leaseId"].as_str().unwrap(),
        lease_id
    );

    // Release twice: true then false
    let (status, value) = rpc(
        &daemon,
        "agent_device.lease.release",
        json!({"leaseId": lease_id, "token": token}),
    );
    assert_eq!(status, 200);
    assert_eq!(value["result"]["data"]["released"], json!(true));

    let (_, value) = rpc(
        &daemon,
        "agent_device.lease.release",
        json!({"leaseId": lease_id, "token": token}),
    );
    assert_eq!(value["result"]["data"]["released"], json!(false));

    // The released lease no longer admits tenant commands
    let (status, value) = rpc(
        &daemon,
        "agent_device.command",
        json!({
            "command": "close",
            "token": token,
            "session": "default",
            "flags": {
                "sessionIsolation": "tenant",
                "tenant": "acme",
                "runId": "run-1",
                "leaseId": lease_id,
            },
        }),
    );
    assert_eq!(status, 401, "{value}");
    assert_eq!(value["error"]["data"]["code"], "UNAUTHORIZED");
}

#[test]
fn heartbeat_scope_mismatch_is_unauthorized() {
    let daemon = Daemon::launch("http");
    let token = daemon.token();

    let (_, value) = rpc(
        &daemon,
        "agent_device.lease.allocate",
        json!({"tenantId": "acme", "runId": "run-9", "token": token}),
    );
    let lease_id = value["result"]["data"]["lease"]["leaseId"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, value) = rpc(
        &daemon,
        "agent_device.lease.heartbeat",
        json!({"leaseId": lease_id, "tenantId": "intruder", "token": token}),
    );
    assert_eq!(status, 401, "{value}");
    let message = value["error"]["data"]["message"].as_str().unwrap();
    assert!(message.starts_with("LEASE_SCOPE_MISMATCH"), "{message}");
}

#[test]
fn invalid_tenant_shape_is_rejected() {
    let daemon = Daemon::launch("http");
    let (status, value) = rpc(
        &daemon,
        "agent_device.lease.allocate",
        json!({"tenantId": "bad tenant!", "runId": "run-1", "token": daemon.token()}),
    );
    assert_eq!(status, 400, "{value}");
    assert_eq!(value["error"]["data"]["code"], "INVALID_ARGS");
}
