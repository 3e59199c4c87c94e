// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orphaned-process sweeps.
//!
//! Two kinds of strays accumulate when requests time out or the daemon
//! dies hard: runner hosts (`idb_companion`, spawned per device by the
//! iOS backend) and app-log streamers whose PIDs are stashed next to
//! their log files.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use crate::process;
use crate::subprocess::{run_cmd, CmdOptions};

/// Command-line patterns that identify runner hosts safe to kill.
///
/// Must match exactly the spawn signature in the iOS backend's
/// `start_runner`; anything broader would kill companions owned by
/// other tooling on the machine.
pub const RUNNER_PATTERNS: &[&str] = &["idb_companion --udid"];

const STOP_TERM: Duration = Duration::from_secs(2);
const STOP_KILL: Duration = Duration::from_secs(2);

/// Kill orphaned runner builds; returns how many were stopped.
pub async fn sweep_runner_orphans() -> usize {
    let mut stopped = 0;
    for pattern in RUNNER_PATTERNS {
        let opts = CmdOptions {
            allow_failure: true,
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let output = match run_cmd("pgrep", &["-f", pattern], opts).await {
            Ok(output) => output,
            Err(e) => {
                debug!(pattern, error = %e, "pgrep unavailable, skipping sweep");
                return stopped;
            }
        };
        for line in output.stdout.lines() {
            let Ok(pid) = line.trim().parse::<u32>() else {
                continue;
            };
            warn!(pid, pattern, "stopping orphaned runner build");
            process::stop_process(pid, STOP_TERM, STOP_KILL, None).await;
            stopped += 1;
        }
    }
    stopped
}

/// Stash a streamer PID next to its log file.
pub fn stash_pid(log_path: &Path, pid: u32) {
    let _ = std::fs::write(pid_path(log_path), pid.to_string());
}

/// Remove a PID stash once its process has been reaped.
pub fn clear_pid(log_path: &Path) {
    let _ = std::fs::remove_file(pid_path(log_path));
}

pub fn read_stashed_pid(log_path: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_path(log_path))
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn pid_path(log_path: &Path) -> std::path::PathBuf {
    let mut path = log_path.as_os_str().to_owned();
    path.push(".pid");
    std::path::PathBuf::from(path)
}

/// Stop app-log streamers whose sessions no longer exist.
///
/// Walks `<sessions>/*/app.log.pid`; any stashed PID that is still
/// alive without a matching live session is an orphan from a previous
/// daemon instance.
pub async fn sweep_app_log_orphans(sessions_dir: &Path, live_sessions: &HashSet<String>) -> usize {
    let Ok(entries) = std::fs::read_dir(sessions_dir) else {
        return 0;
    };

    let mut stopped = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let session_name = entry.file_name().to_string_lossy().to_string();
        let log_path = path.join("app.log");
        let Some(pid) = read_stashed_pid(&log_path) else {
            continue;
        };
        if live_sessions.contains(&session_name) {
            continue;
        }
        if process::process_exists(pid) {
            warn!(pid, session = %session_name, "stopping orphaned app-log streamer");
            process::stop_process(pid, STOP_TERM, STOP_KILL, None).await;
            stopped += 1;
        }
        clear_pid(&log_path);
    }
    stopped
}
