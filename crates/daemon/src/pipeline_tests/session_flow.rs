// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: open, close, journaling, recordings, logs, perf.

use super::*;

#[tokio::test]
async fn open_creates_and_binds_a_session() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = open_default(&state).await;
    assert!(resp.ok, "{:?}", resp.error);

    let data = resp.data.unwrap();
    assert_eq!(data["session"], "default");
    assert_eq!(data["device"]["id"], "FAKE-UDID-1");
    assert_eq!(data["app"]["id"], "Settings");
    assert!(data["startup"]["durationMs"].is_u64());

    let session = state.sessions.get("default").unwrap();
    assert_eq!(session.device.id, "FAKE-UDID-1");
    assert_eq!(session.app.unwrap().id, "Settings");
}

#[tokio::test]
async fn second_session_cannot_steal_the_device() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;

    let req = request(&state, "open")
        .with_session("other")
        .with_args(vec!["Maps".into()]);
    let resp = send(&state, req).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::DeviceInUse));
    assert!(state.sessions.get("other").is_none());
}

#[tokio::test]
async fn failed_open_leaves_no_session_behind() {
    let backend = FakeBackend::new();
    backend.fail_with("open", ad_core::DaemonError::command_failed("launch failed"));
    let (state, _dir) = test_state(backend);

    let resp = open_default(&state).await;
    assert!(!resp.ok);
    assert!(state.sessions.get("default").is_none());
}

#[tokio::test]
async fn open_then_close_leaves_nothing_behind() {
    let (state, dir) = test_state(FakeBackend::new());
    open_default(&state).await;

    let resp = send(&state, request(&state, "close")).await;
    assert!(resp.ok, "{:?}", resp.error);
    let data = resp.data.unwrap();
    assert_eq!(data["closed"], "default");

    assert!(state.sessions.list().is_empty());
    let script = std::path::PathBuf::from(data["script"].as_str().unwrap());
    assert!(script.exists());
    assert!(script.starts_with(dir.path().join("sessions")));
}

#[tokio::test]
async fn close_save_script_writes_to_requested_path() {
    let (state, dir) = test_state(FakeBackend::new());
    open_default(&state).await;
    send(&state, request(&state, "press").with_args(vec!["Login".into()])).await;

    let target = dir.path().join("out/replay.ad");
    let req = request(&state, "close")
        .with_flag("saveScript", json!(target.to_string_lossy()));
    let resp = send(&state, req).await;
    assert!(resp.ok, "{:?}", resp.error);

    let content = std::fs::read_to_string(&target).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "open Settings");
    assert_eq!(lines[1], "press Login");
}

#[tokio::test]
async fn journal_records_startup_sample_for_perf() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;

    let resp = send(&state, request(&state, "perf")).await;
    let data = resp.data.unwrap();
    assert_eq!(data["startup"]["count"], 1);
    assert!(data["startup"]["samples"].as_array().unwrap().len() == 1);
}

#[tokio::test]
async fn session_list_reports_state() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;
    send(&state, request(&state, "press").with_args(vec!["Login".into()])).await;

    let resp = send(&state, request(&state, "session_list")).await;
    let sessions = resp.data.unwrap()["sessions"].clone();
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["name"], "default");
    assert_eq!(sessions[0]["journalLen"], 2);
    assert!(sessions[0]["recording"].is_null());
}

#[tokio::test]
async fn devices_lists_in_scope() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, request(&state, "devices")).await;
    let devices = resp.data.unwrap()["devices"].clone();
    assert_eq!(devices.as_array().unwrap().len(), 1);
    assert_eq!(devices[0]["id"], "FAKE-UDID-1");

    let scoped = request(&state, "devices").with_flag("udid", json!("OTHER"));
    let resp = send(&state, scoped).await;
    assert!(resp.data.unwrap()["devices"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn record_start_stop_cycle() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;

    let resp = send(&state, request(&state, "record").with_args(vec!["start".into()])).await;
    assert!(resp.ok, "{:?}", resp.error);
    let session = state.sessions.get("default").unwrap();
    let recording = session.recording.unwrap();
    assert!(recording.proc.is_some());

    // Starting again is a client error
    let resp = send(&state, request(&state, "record").with_args(vec!["start".into()])).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));

    let resp = send(&state, request(&state, "record").with_args(vec!["stop".into()])).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert!(state.sessions.get("default").unwrap().recording.is_none());
}

#[tokio::test]
async fn logs_start_stop_cycle() {
    let (state, dir) = test_state(FakeBackend::new());
    open_default(&state).await;

    let resp = send(&state, request(&state, "logs").with_args(vec!["start".into()])).await;
    assert!(resp.ok, "{:?}", resp.error);
    let log_path = dir.path().join("sessions/default/app.log");
    assert!(log_path.exists());
    // PID stash exists while streaming
    assert!(ad_backends::orphans::read_stashed_pid(&log_path).is_some());

    let resp = send(&state, request(&state, "logs")).await;
    assert_eq!(resp.data.unwrap()["streaming"], json!(true));

    let resp = send(&state, request(&state, "logs").with_args(vec!["stop".into()])).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert!(ad_backends::orphans::read_stashed_pid(&log_path).is_none());

    let resp = send(&state, request(&state, "logs")).await;
    assert_eq!(resp.data.unwrap()["streaming"], json!(false));
}

#[tokio::test]
async fn close_reaps_recording_and_log_stream() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;
    send(&state, request(&state, "record").with_args(vec!["start".into()])).await;
    send(&state, request(&state, "logs").with_args(vec!["start".into()])).await;

    let resp = send(&state, request(&state, "close")).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert!(state.sessions.list().is_empty());
    // Arena ids 1 and 2 were both reaped
    assert!(state.sessions.take_proc(1).is_none());
    assert!(state.sessions.take_proc(2).is_none());
}

#[tokio::test]
async fn ui_commands_start_one_runner_per_device() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;
    // open itself is not a UI command; no runner yet
    assert_eq!(backend.runners_started(), 0);
    assert_eq!(state.runners.active_count(), 0);

    let resp = send(&state, request(&state, "press").with_args(vec!["Login".into()])).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert_eq!(backend.runners_started(), 1);
    assert_eq!(state.runners.active_count(), 1);
    assert!(state.runners.is_live("FAKE-UDID-1"));

    // The host is reused across UI commands
    send(&state, request(&state, "snapshot")).await;
    send(&state, request(&state, "fill").with_args(vec!["user".into(), "a".into()])).await;
    assert_eq!(backend.runners_started(), 1);

    // Non-UI commands never touch it
    send(&state, request(&state, "apps")).await;
    assert_eq!(backend.runners_started(), 1);
}

#[tokio::test]
async fn aborted_runner_is_respawned_on_next_use() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;
    send(&state, request(&state, "press").with_args(vec!["Login".into()])).await;
    assert_eq!(backend.runners_started(), 1);

    state.runners.signal_abort_all();
    assert!(!state.runners.is_live("FAKE-UDID-1"));

    // The next UI command reaps the aborted host and starts a fresh one
    let resp = send(&state, request(&state, "press").with_args(vec!["Login".into()])).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert_eq!(backend.runners_started(), 2);
    assert_eq!(state.runners.active_count(), 1);
    assert!(state.runners.is_live("FAKE-UDID-1"));
}

#[tokio::test]
async fn snapshot_then_diff_uses_cached_baseline() {
    let backend = FakeBackend::new();
    backend.set_result("snapshot", json!({"snapshot": "a\nb"}));
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;

    let resp = send(&state, request(&state, "snapshot")).await;
    assert!(resp.ok);

    backend.set_result("snapshot", json!({"snapshot": "b\nc"}));
    let resp = send(&state, request(&state, "diff")).await;
    let data = resp.data.unwrap();
    assert_eq!(data["baseline"], json!(true));
    assert_eq!(data["added"], 1);
    assert_eq!(data["removed"], 1);
}

#[tokio::test]
#[serial_test::serial(app_event_env)]
async fn trigger_app_event_resolves_template() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;

    // Template comes from the environment; scoped to this test
    std::env::set_var(
        "AGENT_DEVICE_APP_EVENT_URL_TEMPLATE",
        "app://events/{event}?p={payload}&os={platform}",
    );
    let req = request(&state, "trigger-app-event")
        .with_args(vec!["sync".into()])
        .with_flag("payload", json!("now"));
    let resp = send(&state, req).await;
    std::env::remove_var("AGENT_DEVICE_APP_EVENT_URL_TEMPLATE");

    assert!(resp.ok, "{:?}", resp.error);
    let data = resp.data.unwrap();
    assert_eq!(data["url"], "app://events/sync?p=now&os=ios");
    let calls = backend.calls();
    let openurl = calls.iter().find(|c| c.command == "openurl").unwrap();
    assert_eq!(openurl.args[0], "app://events/sync?p=now&os=ios");
}

#[tokio::test]
#[serial_test::serial(app_event_env)]
async fn trigger_app_event_without_template_is_invalid() {
    let (state, _dir) = test_state(FakeBackend::new());
    open_default(&state).await;
    let resp = send(
        &state,
        request(&state, "trigger-app-event").with_args(vec!["sync".into()]),
    )
    .await;
    assert_eq!(resp.error_code(), Some(ErrorCode::InvalidArgs));
}
