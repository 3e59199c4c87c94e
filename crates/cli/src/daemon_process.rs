// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process management: locating, launching, and stopping `add`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ad_backends::process;
use ad_daemon::metadata::{self, DaemonMetadata};

use crate::client::ClientError;

/// Resolve the state directory the same way the daemon does.
pub fn state_dir() -> Result<PathBuf, ClientError> {
    if let Some(dir) = crate::env::state_dir_override() {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").map_err(|_| ClientError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".agent-device"))
}

/// Find the daemon binary: env override, then a sibling of this
/// executable, then PATH.
pub fn find_daemon_binary() -> PathBuf {
    if let Some(path) = crate::env::daemon_binary() {
        return PathBuf::from(path);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("add");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("add")
}

/// Start the daemon detached, pointing it at the given state directory.
pub fn start_daemon_background(state_dir: &Path) -> Result<std::process::Child, ClientError> {
    let binary = find_daemon_binary();
    Command::new(&binary)
        .env("AGENT_DEVICE_STATE_DIR", state_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(format!("{}: {e}", binary.display())))
}

/// Stop the daemon recorded in metadata, politely then forcibly, and
/// remove stale metadata and lock files.
pub fn stop_daemon_sync(state_dir: &Path) {
    if let Some(meta) = metadata::read_metadata(state_dir) {
        process::stop_process_sync(
            meta.pid,
            crate::env::stop_timeout(),
            crate::env::stop_timeout(),
            meta.process_start_time.as_deref(),
        );
    }
    cleanup_stale_files(state_dir);
}

/// Remove metadata and lock files that no longer describe a live daemon.
pub fn cleanup_stale_files(state_dir: &Path) {
    metadata::remove_metadata(state_dir);
    let lock = metadata::lock_path(state_dir);
    if lock.exists() {
        let _ = std::fs::remove_file(lock);
    }
}

/// Whether the metadata still describes a live daemon of this codebase.
pub fn metadata_is_live(meta: &DaemonMetadata) -> bool {
    process::is_live_daemon_process(
        meta.pid,
        ad_daemon::lifecycle::DAEMON_ENTRY_HINT,
        meta.process_start_time.as_deref(),
    )
}

/// Whether the installed daemon binary still matches the metadata.
///
/// A version or code-signature drift means the daemon must be replaced
/// before serving this client.
pub fn metadata_matches_installed(meta: &DaemonMetadata) -> bool {
    if meta.version != ad_daemon::VERSION {
        return false;
    }
    let binary = find_daemon_binary();
    let root = binary.parent().map(Path::to_path_buf).unwrap_or_default();
    process::code_signature(&binary, &root) == meta.code_signature
}

/// Probe whether a loopback TCP port is accepting connections.
pub fn probe_port(port: u16) -> bool {
    std::net::TcpStream::connect_timeout(
        &std::net::SocketAddr::from(([127, 0, 0, 1], port)),
        std::time::Duration::from_millis(250),
    )
    .is_ok()
}

/// Parse startup errors out of the daemon log, scoped to the most
/// recent startup marker.
pub fn read_startup_error(state_dir: &Path) -> Option<String> {
    let content = std::fs::read_to_string(state_dir.join("daemon.log")).ok()?;
    parse_startup_error(&content)
}

const STARTUP_MARKER_PREFIX: &str = "--- add: starting (pid: ";

fn parse_startup_error(content: &str) -> Option<String> {
    let start = content.rfind(STARTUP_MARKER_PREFIX)?;
    let errors: Vec<&str> = content[start..]
        .lines()
        .filter(|line| line.contains("ERROR") || line.contains("Failed to start"))
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("\n"))
    }
}
