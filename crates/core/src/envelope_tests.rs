// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_defaults_apply() {
    let req: Request = serde_json::from_value(json!({"command": "session_list"})).unwrap();
    assert_eq!(req.session, "default");
    assert!(req.args.is_empty());
    assert!(req.flags.is_empty());
    assert!(req.token.is_none());
    assert!(!req.meta.debug);
}

#[test]
fn request_meta_uses_camel_case() {
    let req: Request = serde_json::from_value(json!({
        "command": "close",
        "meta": {
            "requestId": "r-1",
            "tenantId": "acme",
            "runId": "run-1",
            "leaseId": "abcd",
            "sessionIsolation": "tenant",
        }
    }))
    .unwrap();
    assert_eq!(req.meta.request_id.as_deref(), Some("r-1"));
    assert_eq!(req.meta.tenant_id.as_deref(), Some("acme"));
    assert_eq!(req.meta.session_isolation, Some(SessionIsolation::Tenant));
}

#[test]
fn flags_typed_accessors() {
    let mut flags = Flags::new();
    flags.insert("device", json!("iPhone 16"));
    flags.insert("debug", json!(true));
    flags.insert("ttlMs", json!(60000));
    flags.insert("maxSteps", json!("25"));

    assert_eq!(flags.get_str("device"), Some("iPhone 16"));
    assert!(flags.get_bool("debug"));
    assert!(!flags.get_bool("missing"));
    assert_eq!(flags.get_u64("ttlMs"), Some(60000));
    assert_eq!(flags.get_u64("maxSteps"), Some(25));
}

#[test]
fn flags_merge_prefers_overrides() {
    let mut base = Flags::new();
    base.insert("platform", json!("ios"));
    base.insert("device", json!("iPhone 16"));
    let mut step = Flags::new();
    step.insert("device", json!("iPad"));

    let merged = base.merged_with(&step);
    assert_eq!(merged.get_str("platform"), Some("ios"));
    assert_eq!(merged.get_str("device"), Some("iPad"));
}

#[test]
fn response_success_shape() {
    let resp = Response::success(json!({"sessions": []}));
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value, json!({"ok": true, "data": {"sessions": []}}));
}

#[test]
fn response_failure_shape() {
    let resp = Response::failure(crate::error::DaemonError::unauthorized("bad token"));
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "UNAUTHORIZED");
    assert!(value.get("data").is_none());
}
