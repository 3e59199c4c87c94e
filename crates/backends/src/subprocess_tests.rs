// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ad_core::ErrorCode;

#[tokio::test]
async fn run_cmd_captures_stdout() {
    let output = run_cmd("echo", &["hello"], CmdOptions::default())
        .await
        .unwrap();
    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello");
}

#[tokio::test]
async fn run_cmd_nonzero_exit_is_command_failed() {
    let err = run_cmd("false", &[], CmdOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandFailed);
    let details = err.details.unwrap();
    assert_eq!(details["exitCode"], 1);
}

#[tokio::test]
async fn run_cmd_allow_failure_returns_output() {
    let opts = CmdOptions {
        allow_failure: true,
        ..Default::default()
    };
    let output = run_cmd("false", &[], opts).await.unwrap();
    assert_eq!(output.exit_code, 1);
}

#[tokio::test]
async fn run_cmd_missing_binary_is_tool_missing() {
    let err = run_cmd("definitely-not-a-real-binary", &[], CmdOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ToolMissing);
}

#[tokio::test]
async fn run_cmd_times_out() {
    let opts = CmdOptions::with_timeout(Duration::from_millis(100));
    let err = run_cmd("sleep", &["10"], opts).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::CommandFailed);
    assert!(err.message.contains("timed out"), "got: {}", err.message);
}

#[tokio::test]
async fn run_cmd_honors_cancellation() {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        flag.cancel();
    });
    let opts = CmdOptions {
        cancel: Some(cancel),
        timeout: Some(Duration::from_secs(10)),
        ..Default::default()
    };
    let start = std::time::Instant::now();
    let err = run_cmd("sleep", &["10"], opts).await.unwrap_err();
    assert_eq!(err.message, "request canceled");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn run_cmd_feeds_stdin() {
    let opts = CmdOptions {
        stdin: Some("line one\n".to_string()),
        ..Default::default()
    };
    let output = run_cmd("cat", &[], opts).await.unwrap();
    assert_eq!(output.stdout, "line one\n");
}

#[test]
fn run_cmd_sync_works() {
    let output = run_cmd_sync("echo", &["sync"]).unwrap();
    assert_eq!(output.stdout.trim(), "sync");
}

#[yare::parameterized(
    boot = { "android_boot", 120 },
    devicectl = { "ios_devicectl", 60 },
    launch = { "ios_app_launch", 30 },
    other = { "anything-else", 30 },
)]
fn profile_timeouts(profile: &str, secs: u64) {
    assert_eq!(profile_timeout(profile), Duration::from_secs(secs));
}

#[tokio::test]
async fn retry_stops_when_predicate_rejects() {
    let policy = RetryPolicy {
        attempts: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = calls.clone();
    let result: Result<(), _> = with_retry(&policy, |_| false, move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(DaemonError::command_failed("nope"))
        }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_retries_until_success() {
    let policy = RetryPolicy {
        attempts: 4,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };
    let result = with_retry(&policy, |_| true, |attempt| async move {
        if attempt < 2 {
            Err(DaemonError::command_failed("transient"))
        } else {
            Ok(attempt)
        }
    })
    .await
    .unwrap();
    assert_eq!(result, 2);
}
