// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch and replay behavior.

use super::*;

fn batch_request(state: &DaemonState, step_list: serde_json::Value) -> Request {
    request(state, "batch").with_flag("steps", step_list)
}

#[tokio::test]
async fn batch_runs_steps_in_order() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());

    let req = batch_request(
        &state,
        json!([
            {"command": "open", "args": ["Settings"]},
            {"command": "press", "args": ["General"]},
            {"command": "press", "args": ["About"]},
        ]),
    );
    let resp = send(&state, req).await;
    assert!(resp.ok, "{:?}", resp.error);

    let data = resp.data.unwrap();
    assert_eq!(data["total"], 3);
    assert_eq!(data["executed"], 3);
    assert!(data["totalDurationMs"].is_u64());
    assert_eq!(data["results"].as_array().unwrap().len(), 3);
    assert_eq!(backend.commands_run(), vec!["open", "press", "press"]);
}

#[tokio::test]
async fn batch_fails_fast_with_partial_results() {
    let backend = FakeBackend::new();
    backend.fail_with(
        "press",
        ad_core::DaemonError::command_failed("no element matching '@e1'"),
    );
    let (state, _dir) = test_state(backend);

    let req = batch_request(
        &state,
        json!([
            {"command": "open", "args": ["Settings"]},
            {"command": "press", "args": ["@e1"]},
            {"command": "press", "args": ["never-reached"]},
        ]),
    );
    let resp = send(&state, req).await;

    let err = resp.error.unwrap();
    assert_eq!(err.code, ErrorCode::CommandFailed);
    let details = err.details.unwrap();
    assert_eq!(details["step"], 2);
    assert_eq!(details["executed"], 1);
    assert_eq!(details["partialResults"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn nested_batch_is_rejected() {
    let (state, _dir) = test_state(FakeBackend::new());
    let req = batch_request(&state, json!([{"command": "batch"}]));
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));

    let req = batch_request(&state, json!([{"command": "replay", "args": ["x.ad"]}]));
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}

#[tokio::test]
async fn batch_enforces_max_steps() {
    let (state, _dir) = test_state(FakeBackend::new());
    let many: Vec<serde_json::Value> = (0..5)
        .map(|i| json!({"command": "press", "args": [format!("b{i}")]}))
        .collect();
    let req = batch_request(&state, json!(many)).with_flag("maxSteps", json!(3));
    let resp = send(&state, req).await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, ErrorCode::InvalidArgs);
    assert!(err.message.contains("exceeds"));
}

#[tokio::test]
async fn batch_steps_inherit_parent_selector_flags() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;

    // A parent selector incompatible with the bound device must fail
    // inside the step, proving inheritance
    let req = batch_request(&state, json!([{"command": "press", "args": ["x"]}]))
        .with_flag("udid", json!("WRONG-DEVICE"));
    let resp = send(&state, req).await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, ErrorCode::InvalidArgs);
    assert_eq!(err.details.unwrap()["step"], 1);
}

#[tokio::test]
async fn batch_requires_steps_flag() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, request(&state, "batch")).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}

#[tokio::test]
async fn replay_executes_script_lines() {
    let backend = FakeBackend::new();
    let (state, dir) = test_state(backend.clone());

    let script = dir.path().join("flow.ad");
    std::fs::write(
        &script,
        "# warm up\nopen Settings\npress General\n\npress About\n",
    )
    .unwrap();

    let req = request(&state, "replay")
        .with_args(vec![script.to_string_lossy().to_string()]);
    let resp = send(&state, req).await;
    assert!(resp.ok, "{:?}", resp.error);

    let data = resp.data.unwrap();
    assert_eq!(data["total"], 3);
    assert_eq!(data["executed"], 3);
    assert_eq!(data["updated"], 0);
    assert_eq!(backend.commands_run(), vec!["open", "press", "press"]);
}

#[tokio::test]
async fn replay_failure_reports_line() {
    let backend = FakeBackend::new();
    backend.fail_with("press", ad_core::DaemonError::command_failed("gone"));
    let (state, dir) = test_state(backend);

    let script = dir.path().join("flow.ad");
    std::fs::write(&script, "open Settings\npress Login\n").unwrap();

    let req = request(&state, "replay")
        .with_args(vec![script.to_string_lossy().to_string()]);
    let resp = send(&state, req).await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, ErrorCode::CommandFailed);
    let details = err.details.unwrap();
    assert_eq!(details["line"], 2);
    assert_eq!(details["executed"], 1);
}

#[tokio::test]
async fn replay_missing_script_is_invalid() {
    let (state, _dir) = test_state(FakeBackend::new());
    let req = request(&state, "replay").with_args(vec!["/nope/flow.ad".into()]);
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}

#[tokio::test]
async fn journal_round_trips_through_replay() {
    // Record a journal, close with a saved script, replay the script:
    // the replayed commands match the original journal.
    let backend = FakeBackend::new();
    let (state, dir) = test_state(backend.clone());
    open_default(&state).await;
    send(&state, request(&state, "fill").with_args(vec!["user".into(), "alice smith".into()])).await;
    send(&state, request(&state, "press").with_args(vec!["Sign In".into()])).await;

    let script = dir.path().join("session.ad");
    let close = request(&state, "close")
        .with_flag("saveScript", json!(script.to_string_lossy()));
    assert!(send(&state, close).await.ok);

    let before = backend.commands_run();
    let req = request(&state, "replay")
        .with_args(vec![script.to_string_lossy().to_string()]);
    let resp = send(&state, req).await;
    assert!(resp.ok, "{:?}", resp.error);

    let after = backend.commands_run();
    let replayed: Vec<String> = after[before.len()..].to_vec();
    assert_eq!(replayed, vec!["open", "fill", "press"]);

    // The replayed open rebuilt the session; args round-tripped intact
    let fill_calls: Vec<_> = backend
        .calls()
        .into_iter()
        .filter(|c| c.command == "fill")
        .collect();
    assert_eq!(fill_calls.len(), 2);
    assert_eq!(fill_calls[1].args, vec!["user", "alice smith"]);
}
