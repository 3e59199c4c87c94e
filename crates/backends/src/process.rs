// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process identity: liveness, start-time tokens, polite stops.
//!
//! Everything here is best-effort and never raises: callers get explicit
//! booleans and `Option`s. The start-time token is the raw, trimmed
//! output of `ps -o lstart=`, treated as opaque; two reads are equal iff
//! they observed the same live process.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Execute `kill` with the given signal; true when the signal was delivered.
pub fn signal(pid: u32, sig: &str) -> bool {
    Command::new("kill")
        .args([sig, &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check whether a process with the given PID exists.
pub fn process_exists(pid: u32) -> bool {
    signal(pid, "-0")
}

/// OS-provided start-time token for a PID.
pub fn read_start_time(pid: u32) -> Option<String> {
    let output = Command::new("ps")
        .args(["-o", "lstart=", "-p", &pid.to_string()])
        .stdin(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Command line of a PID, empty when unreadable.
fn read_command_line(pid: u32) -> String {
    Command::new("ps")
        .args(["-o", "command=", "-p", &pid.to_string()])
        .stdin(Stdio::null())
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default()
}

/// Whether `pid` is a live daemon of this codebase.
///
/// Guards against PID reuse: the command line must mention the daemon
/// entry name and, when a start-time token is supplied, it must match
/// what the OS reports now.
pub fn is_live_daemon_process(pid: u32, entry_hint: &str, expected_start_time: Option<&str>) -> bool {
    if !process_exists(pid) {
        return false;
    }
    if !read_command_line(pid).contains(entry_hint) {
        return false;
    }
    match expected_start_time {
        Some(expected) => read_start_time(pid).as_deref() == Some(expected),
        None => true,
    }
}

/// Send polite termination, poll for exit, then kill.
///
/// Returns regardless of whether the target ever existed. When an
/// expected start time is given and no longer matches, the PID has been
/// reused and no signal is sent.
pub async fn stop_process(
    pid: u32,
    term_timeout: Duration,
    kill_timeout: Duration,
    expected_start_time: Option<&str>,
) {
    if let Some(expected) = expected_start_time {
        if read_start_time(pid).as_deref() != Some(expected) {
            return;
        }
    }

    if !process_exists(pid) {
        return;
    }

    signal(pid, "-15");
    if wait_for_exit(pid, term_timeout).await {
        return;
    }

    signal(pid, "-9");
    wait_for_exit(pid, kill_timeout).await;
}

/// Blocking variant for sync contexts (client bootstrap).
pub fn stop_process_sync(
    pid: u32,
    term_timeout: Duration,
    kill_timeout: Duration,
    expected_start_time: Option<&str>,
) {
    if let Some(expected) = expected_start_time {
        if read_start_time(pid).as_deref() != Some(expected) {
            return;
        }
    }

    if !process_exists(pid) {
        return;
    }

    signal(pid, "-15");
    if wait_for_exit_sync(pid, term_timeout) {
        return;
    }

    signal(pid, "-9");
    wait_for_exit_sync(pid, kill_timeout);
}

async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !process_exists(pid)
}

fn wait_for_exit_sync(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    !process_exists(pid)
}

/// Stable fingerprint of the daemon binary: `<rel>:<size>:<mtime-ms>`.
///
/// Used to detect that the installed binary changed since the running
/// daemon was launched, which triggers a client-side takeover.
pub fn code_signature(entry: &Path, root: &Path) -> String {
    let rel = entry
        .strip_prefix(root)
        .ok()
        .map(|p| p.to_string_lossy().to_string())
        .or_else(|| entry.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| entry.to_string_lossy().to_string());

    let (size, mtime_ms) = match entry.metadata() {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            (meta.len(), mtime)
        }
        Err(_) => (0, 0),
    };

    format!("{rel}:{size}:{mtime_ms}")
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
