// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline behavior tests against the fake backend.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use ad_backends::FakeBackend;
use ad_core::{ErrorCode, Request, Response};

use crate::lifecycle::Config;
use crate::pipeline::handle_request;
use crate::DaemonState;

mod admission;
mod batch_replay;
mod session_flow;

pub(crate) fn test_state(backend: FakeBackend) -> (Arc<DaemonState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().to_path_buf());
    let state = Arc::new(DaemonState::new(
        config,
        vec![Arc::new(backend)],
        None,
    ));
    (state, dir)
}

pub(crate) fn request(state: &DaemonState, command: &str) -> Request {
    Request::new(command).with_token(state.token.clone())
}

pub(crate) async fn send(state: &Arc<DaemonState>, req: Request) -> Response {
    handle_request(state, req).await
}

pub(crate) async fn open_default(state: &Arc<DaemonState>) -> Response {
    let req = request(state, "open").with_args(vec!["Settings".into()]);
    send(state, req).await
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, Request::new("session_list")).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::Unauthorized));
}

#[tokio::test]
async fn wrong_token_is_unauthorized() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, Request::new("session_list").with_token("nope")).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::Unauthorized));
    // No details leak on auth failures
    assert!(resp.error.unwrap().details.is_none());
}

#[tokio::test]
async fn correct_token_passes() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, request(&state, "session_list")).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert_eq!(resp.data.unwrap()["sessions"], json!([]));
}

#[tokio::test]
async fn click_alias_becomes_press() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;

    let req = request(&state, "click").with_args(vec!["Login".into()]);
    let resp = send(&state, req).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert!(backend.commands_run().contains(&"press".to_string()));
}

#[tokio::test]
async fn unknown_command_reaches_backend() {
    // The capability matrix treats unknown commands as supported, so
    // they dispatch instead of being rejected up front.
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;

    let resp = send(&state, request(&state, "hologram")).await;
    assert!(resp.ok, "{:?}", resp.error);
    assert!(backend.commands_run().contains(&"hologram".to_string()));
}

#[tokio::test]
async fn unsupported_command_is_rejected_before_dispatch() {
    let backend = FakeBackend::new();
    let (state, _dir) = test_state(backend.clone());
    open_default(&state).await;

    // keyboard is Android-only; the fake device is an iOS simulator
    let resp = send(&state, request(&state, "keyboard").with_args(vec!["enter".into()])).await;
    assert_eq!(resp.error_code(), Some(ErrorCode::UnsupportedOperation));
    assert!(!backend.commands_run().contains(&"keyboard".to_string()));
}

#[tokio::test]
async fn command_without_session_is_session_not_found() {
    let (state, _dir) = test_state(FakeBackend::new());
    let resp = send(&state, request(&state, "press").with_args(vec!["x".into()])).await;
    let err = resp.error.unwrap();
    assert_eq!(err.code, ErrorCode::SessionNotFound);
    assert_eq!(err.hint.as_deref(), Some("Open an app first to create a session."));
}

#[tokio::test]
async fn failures_carry_diagnostics() {
    let backend = FakeBackend::new();
    backend.fail_with(
        "press",
        ad_core::DaemonError::command_failed("element vanished"),
    );
    let (state, dir) = test_state(backend);
    open_default(&state).await;

    let resp = send(&state, request(&state, "press").with_args(vec!["x".into()])).await;
    let err = resp.error.unwrap();
    assert!(err.diagnostic_id.is_some());
    let log_path = err.log_path.unwrap();
    assert!(log_path.starts_with(dir.path().join("logs")));
    assert!(log_path.exists());
    let content = std::fs::read_to_string(&log_path).unwrap();
    assert!(content.contains("request_failed"));
}
