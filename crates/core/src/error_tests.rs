// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn codes_serialize_screaming_snake() {
    let json = serde_json::to_string(&ErrorCode::InvalidArgs).unwrap();
    assert_eq!(json, "\"INVALID_ARGS\"");
    let json = serde_json::to_string(&ErrorCode::SessionNotFound).unwrap();
    assert_eq!(json, "\"SESSION_NOT_FOUND\"");
}

#[test]
fn normalize_fills_default_hint() {
    let err = DaemonError::invalid_args("bad flag").normalize();
    assert_eq!(err.hint.as_deref(), Some("Check command arguments and run --help."));
}

#[test]
fn normalize_keeps_explicit_hint() {
    let err = DaemonError::invalid_args("bad flag")
        .with_hint("use --udid")
        .normalize();
    assert_eq!(err.hint.as_deref(), Some("use --udid"));
}

#[test]
fn normalize_lifts_transport_fields_from_details() {
    let err = DaemonError::command_failed("boom")
        .with_details(json!({
            "hint": "try again",
            "diagnosticId": "d-123",
            "logPath": "/tmp/x.ndjson",
            "extra": 1,
        }))
        .normalize();

    assert_eq!(err.hint.as_deref(), Some("try again"));
    assert_eq!(err.diagnostic_id.as_deref(), Some("d-123"));
    assert_eq!(err.log_path.as_deref(), Some(std::path::Path::new("/tmp/x.ndjson")));
    let details = err.details.unwrap();
    assert_eq!(details, json!({"extra": 1}));
}

#[test]
fn normalize_drops_empty_details() {
    let err = DaemonError::command_failed("boom")
        .with_details(json!({"hint": "h"}))
        .normalize();
    assert!(err.details.is_none());
}

#[test]
fn normalize_redacts_secret_values() {
    let err = DaemonError::command_failed("boom")
        .with_details(json!({"token": "s3cret", "env": {"apiKey": "k"}}))
        .normalize();
    let details = err.details.unwrap();
    assert_eq!(details["token"], "[REDACTED]");
    assert_eq!(details["env"]["apiKey"], "[REDACTED]");
}

#[test]
fn normalize_prefers_first_informative_stderr_line() {
    let err = DaemonError::command_failed("adb exited with status 1")
        .with_details(json!({
            "exitCode": 1,
            "stderr": "warning: harmless\n\nerror: device 'emulator-5554' not found\nmore context",
        }))
        .normalize();
    assert_eq!(err.message, "error: device 'emulator-5554' not found");
}

#[test]
fn normalize_truncates_long_stderr_line() {
    let long = "x".repeat(400);
    let err = DaemonError::command_failed("exit")
        .with_details(json!({"exitCode": 1, "stderr": long}))
        .normalize();
    assert_eq!(err.message.len(), 200);
}

#[test]
fn normalize_leaves_message_without_exit_code_marker() {
    let err = DaemonError::command_failed("handler message")
        .with_details(json!({"stderr": "error: raw"}))
        .normalize();
    assert_eq!(err.message, "handler message");
}

#[test]
fn error_round_trips_through_json() {
    let err = DaemonError::unauthorized("LEASE_NOT_FOUND")
        .with_details(json!({"leaseId": "[REDACTED]"}));
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["code"], "UNAUTHORIZED");
    let back: DaemonError = serde_json::from_value(json).unwrap();
    assert_eq!(back, err);
}
