// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon metadata and lock files.
//!
//! `daemon.json` is how clients find a running daemon: ports, the
//! per-run token, and enough identity (pid, start time, version, code
//! signature) to detect staleness. It is written atomically with 0600
//! permissions because it carries the token.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    pub transport: String,
    pub token: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_start_time: Option<String>,
    pub version: String,
    pub code_signature: String,
    pub state_dir: PathBuf,
}

/// Contents of the singleton lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    pub started_at_ms: u64,
    pub version: String,
}

pub fn metadata_path(state_dir: &Path) -> PathBuf {
    state_dir.join("daemon.json")
}

pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join("daemon.lock")
}

/// Write metadata atomically: temp file, 0600, rename into place.
pub fn write_metadata(state_dir: &Path, metadata: &DaemonMetadata) -> std::io::Result<()> {
    std::fs::create_dir_all(state_dir)?;
    let final_path = metadata_path(state_dir);
    let tmp_path = state_dir.join(".daemon.json.tmp");

    let json = serde_json::to_vec_pretty(metadata)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    set_owner_only(&file)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

pub fn read_metadata(state_dir: &Path) -> Option<DaemonMetadata> {
    let raw = std::fs::read_to_string(metadata_path(state_dir)).ok()?;
    serde_json::from_str(&raw).ok()
}

pub fn remove_metadata(state_dir: &Path) {
    let _ = std::fs::remove_file(metadata_path(state_dir));
}

pub fn read_lock(state_dir: &Path) -> Option<LockInfo> {
    let raw = std::fs::read_to_string(lock_path(state_dir)).ok()?;
    serde_json::from_str(&raw).ok()
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
