//! CLI specs: bootstrap, daemon management, one command end to end.

use crate::prelude::*;
use std::process::Command;

fn ad_cmd(state_dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(binary_path("ad"));
    cmd.env("AGENT_DEVICE_STATE_DIR", state_dir)
        .env("AGENT_DEVICE_DAEMON_BINARY", binary_path("add"))
        .env("AGENT_DEVICE_DAEMON_TIMEOUT_MS", "10000");
    cmd
}

fn kill_daemon(state_dir: &std::path::Path) {
    if let Some(meta) = read_metadata(state_dir) {
        if let Some(pid) = meta["pid"].as_u64() {
            signal(pid as u32, "-9");
        }
    }
}

#[test]
fn status_reports_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let output = ad_cmd(dir.path()).args(["daemon", "status"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("not running"));
}

#[test]
fn daemon_start_status_stop_cycle() {
    let dir = tempfile::tempdir().unwrap();

    let output = ad_cmd(dir.path()).args(["daemon", "start"]).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(read_metadata(dir.path()).is_some());

    let output = ad_cmd(dir.path()).args(["daemon", "status"]).output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(stdout.contains("running"), "stdout: {stdout}");
    assert!(stdout.contains("pid:"));

    let output = ad_cmd(dir.path()).args(["daemon", "stop"]).output().unwrap();
    assert!(output.status.success());
    assert!(
        wait_until(STARTUP_WAIT, || read_metadata(dir.path()).is_none()),
        "metadata should be cleaned up after stop"
    );
}

#[test]
fn device_command_autostarts_daemon() {
    let dir = tempfile::tempdir().unwrap();

    let output = ad_cmd(dir.path())
        .args(["session_list", "--json"])
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("\"ok\": true"), "stdout: {stdout}");
    assert!(stdout.contains("\"sessions\""), "stdout: {stdout}");

    // The daemon it launched is alive and owns the state dir
    let meta = read_metadata(dir.path()).unwrap();
    assert!(process_exists(meta["pid"].as_u64().unwrap() as u32));

    kill_daemon(dir.path());
}

#[test]
fn failing_command_exits_nonzero_with_error_code() {
    let dir = tempfile::tempdir().unwrap();

    let output = ad_cmd(dir.path()).args(["perf"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    assert!(stderr.contains("SESSION_NOT_FOUND"), "stderr: {stderr}");

    kill_daemon(dir.path());
}

#[test]
fn takeover_replaces_outdated_daemon() {
    let dir = tempfile::tempdir().unwrap();
    // Private copy of the daemon binary so mutating it cannot affect
    // other tests sharing the build output
    let bin_copy = dir.path().join("add");
    std::fs::copy(binary_path("add"), &bin_copy).unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&bin_copy, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let state_dir = tempfile::tempdir().unwrap();
    let bin_str = bin_copy.to_string_lossy().to_string();

    let mut cmd = Command::new(binary_path("ad"));
    cmd.env("AGENT_DEVICE_STATE_DIR", state_dir.path())
        .env("AGENT_DEVICE_DAEMON_BINARY", &bin_str);
    let output = cmd.args(["daemon", "start"]).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let first_pid = read_metadata(state_dir.path()).unwrap()["pid"].as_u64().unwrap() as u32;

    // Change the installed binary's code signature (size + mtime);
    // trailing bytes do not affect an ELF executable
    {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().append(true).open(&bin_copy).unwrap();
        file.write_all(b"\0").unwrap();
    }

    // The next client observes the drift, stops the old daemon, and
    // launches a fresh one before serving the command
    let mut cmd = Command::new(binary_path("ad"));
    cmd.env("AGENT_DEVICE_STATE_DIR", state_dir.path())
        .env("AGENT_DEVICE_DAEMON_BINARY", &bin_str);
    let output = cmd.args(["session_list", "--json"]).output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let meta = read_metadata(state_dir.path()).unwrap();
    let second_pid = meta["pid"].as_u64().unwrap() as u32;
    assert_ne!(first_pid, second_pid, "daemon should have been replaced");
    assert!(
        wait_until(STARTUP_WAIT, || !process_exists(first_pid)),
        "old daemon should be stopped"
    );
    assert!(process_exists(second_pid));

    kill_daemon(state_dir.path());
}
