// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn current_process_exists() {
    assert!(process_exists(std::process::id()));
}

#[test]
fn nonexistent_pid_does_not_exist() {
    // PID 4194304 is above the default Linux pid_max
    assert!(!process_exists(4_194_304));
}

#[test]
fn start_time_token_is_stable_for_live_process() {
    let pid = std::process::id();
    let a = read_start_time(pid).unwrap();
    let b = read_start_time(pid).unwrap();
    assert_eq!(a, b);
    assert!(!a.is_empty());
}

#[test]
fn start_time_is_none_for_dead_pid() {
    assert_eq!(read_start_time(4_194_304), None);
}

#[test]
fn live_daemon_check_requires_matching_command_line() {
    let pid = std::process::id();
    // The test binary's command line will not contain this marker
    assert!(!is_live_daemon_process(pid, "no-such-entry-marker", None));
}

#[test]
fn live_daemon_check_rejects_mismatched_start_time() {
    let pid = std::process::id();
    assert!(!is_live_daemon_process(pid, "", Some("Thu Jan  1 00:00:00 1970")));
}

#[tokio::test]
async fn stop_process_returns_for_nonexistent_pid() {
    stop_process(
        4_194_304,
        Duration::from_millis(100),
        Duration::from_millis(100),
        None,
    )
    .await;
}

#[tokio::test]
async fn stop_process_terminates_a_child() {
    let child = std::process::Command::new("sleep")
        .arg("30")
        .stdin(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id();
    assert!(process_exists(pid));

    stop_process(pid, Duration::from_secs(2), Duration::from_secs(2), None).await;

    // Reap the zombie so process_exists reflects reality
    let mut child = child;
    let _ = child.wait();
    assert!(!process_exists(pid));
}

#[test]
fn stop_process_skips_reused_pid() {
    let pid = std::process::id();
    // A start time that cannot match means the PID was "reused"; the
    // call must return without signaling us.
    stop_process_sync(
        pid,
        Duration::from_millis(10),
        Duration::from_millis(10),
        Some("Thu Jan  1 00:00:00 1970"),
    );
    assert!(process_exists(pid));
}

#[test]
fn code_signature_shape() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("bin").join("add");
    std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
    std::fs::write(&bin, b"fake daemon").unwrap();

    let sig = code_signature(&bin, dir.path());
    let parts: Vec<&str> = sig.split(':').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "bin/add");
    assert_eq!(parts[1], "11");
    assert!(parts[2].parse::<u64>().unwrap() > 0);
}

#[test]
fn code_signature_changes_with_content() {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("add");
    std::fs::write(&bin, b"one").unwrap();
    let first = code_signature(&bin, dir.path());
    std::fs::write(&bin, b"longer content").unwrap();
    let second = code_signature(&bin, dir.path());
    assert_ne!(first, second);
}

#[test]
fn code_signature_for_missing_file() {
    let sig = code_signature(Path::new("/nope/add"), Path::new("/nope"));
    assert_eq!(sig, "add:0:0");
}
