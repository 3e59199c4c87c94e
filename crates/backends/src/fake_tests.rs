// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ad_core::{CancelFlag, Flags};

fn ctx() -> ExecCtx {
    ExecCtx {
        daemon_log: "/tmp/daemon.log".into(),
        debug: false,
        out: None,
        bundle_id: None,
        trace_log: None,
        request_id: "r-1".into(),
        cancel: CancelFlag::new(),
    }
}

fn invocation(command: &str) -> Invocation {
    Invocation::new(command, vec![], Flags::new())
}

#[tokio::test]
async fn discover_honors_selector() {
    let backend = FakeBackend::new();
    let all = backend.discover(&Selector::default()).await.unwrap();
    assert_eq!(all.len(), 1);

    let selector = Selector {
        udid: Some("NOPE".into()),
        ..Default::default()
    };
    assert!(backend.discover(&selector).await.unwrap().is_empty());
}

#[tokio::test]
async fn run_records_calls_and_returns_scripted_result() {
    let backend = FakeBackend::new();
    backend.set_result("snapshot", serde_json::json!({"snapshot": "tree"}));
    let device = backend.discover(&Selector::default()).await.unwrap().remove(0);

    let result = backend
        .run(&device, &invocation("snapshot"), &ctx())
        .await
        .unwrap();
    assert_eq!(result["snapshot"], "tree");
    assert_eq!(backend.commands_run(), vec!["snapshot"]);
}

#[tokio::test]
async fn scripted_failure_propagates() {
    let backend = FakeBackend::new();
    backend.fail_with("press", DaemonError::command_failed("no element"));
    let device = backend.discover(&Selector::default()).await.unwrap().remove(0);

    let err = backend
        .run(&device, &invocation("press"), &ctx())
        .await
        .unwrap_err();
    assert_eq!(err.message, "no element");
}

#[tokio::test]
async fn start_runner_spawns_a_host() {
    let backend = FakeBackend::new();
    let device = backend.discover(&Selector::default()).await.unwrap().remove(0);

    let child = backend.start_runner(&device).await.unwrap().unwrap();
    assert!(child.id().is_some());
    assert_eq!(backend.runners_started(), 1);
    // kill_on_drop reaps the host
    drop(child);
}

#[tokio::test]
async fn delay_is_cancellable() {
    let backend = FakeBackend::new();
    backend.set_delay(Duration::from_secs(30));
    let device = backend.discover(&Selector::default()).await.unwrap().remove(0);

    let mut ctx = ctx();
    let cancel = CancelFlag::new();
    ctx.cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let start = std::time::Instant::now();
    let err = backend
        .run(&device, &invocation("open"), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.message, "request canceled");
    assert!(start.elapsed() < Duration::from_secs(5));
}
