// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: singleton election, startup, graceful shutdown.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use ad_backends::{orphans, process, DeviceBackend};
use ad_core::Clock;

use crate::env::ServerMode;
use crate::metadata::{self, DaemonMetadata, LockInfo};
use crate::DaemonState;

/// Marker the liveness check looks for in a candidate's command line.
pub const DAEMON_ENTRY_HINT: &str = "add";

/// Daemon configuration: every path lives under the state directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub lock_path: PathBuf,
    pub metadata_path: PathBuf,
    pub log_path: PathBuf,
    /// Per-session diagnostic ndjson files.
    pub logs_path: PathBuf,
    pub sessions_path: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::at(crate::env::state_dir()?))
    }

    pub fn at(state_dir: PathBuf) -> Self {
        Self {
            lock_path: metadata::lock_path(&state_dir),
            metadata_path: metadata::metadata_path(&state_dir),
            log_path: state_dir.join("daemon.log"),
            logs_path: state_dir.join("logs"),
            sessions_path: state_dir.join("sessions"),
            state_dir,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("another daemon owns the lock (pid {pid})")]
    LockHeld { pid: u32 },

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of daemon startup.
pub struct StartupResult {
    pub state: Arc<DaemonState>,
    pub socket: Option<TcpListener>,
    pub http: Option<TcpListener>,
}

/// Acquire the singleton lock.
///
/// Exclusive-create the lock file when absent; when it exists, the
/// advisory lock arbitrates concurrent starters atomically and the
/// recorded identity decides between "live daemon, yield" and "stale
/// predecessor, take over". A stale lock is reclaimed in place (same
/// inode) so two racing starters can never both win.
pub fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Open without truncating: the file may belong to a running daemon
    // whose recorded PID must survive until we hold the lock.
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;

    if file.try_lock_exclusive().is_err() {
        let pid = metadata::read_lock(&config.state_dir)
            .map(|l| l.pid)
            .unwrap_or(0);
        return Err(LifecycleError::LockHeld { pid });
    }

    // We hold the lock, but the recorded holder may still be a live
    // daemon that predates advisory locking of this file (or one whose
    // lock was dropped). Trust the identity check over the lock.
    if let Some(info) = metadata::read_lock(&config.state_dir) {
        if info.pid != std::process::id()
            && process::is_live_daemon_process(
                info.pid,
                DAEMON_ENTRY_HINT,
                info.start_time.as_deref(),
            )
        {
            return Err(LifecycleError::LockHeld { pid: info.pid });
        }
        if info.pid != 0 {
            warn!(pid = info.pid, "reclaiming stale daemon lock");
        }
    }

    file.set_len(0)?;
    let info = LockInfo {
        pid: std::process::id(),
        start_time: process::read_start_time(std::process::id()),
        started_at_ms: ad_core::SystemClock.now_ms(),
        version: crate::VERSION.to_string(),
    };
    let json = serde_json::to_string(&info)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{json}")?;
    Ok(file)
}

/// Bring the daemon up: lock, state, servers, metadata.
pub async fn startup(
    config: &Config,
    backends: Vec<Arc<dyn DeviceBackend>>,
    mode: ServerMode,
) -> Result<StartupResult, LifecycleError> {
    let lock_file = acquire_lock(config)?;
    match startup_inner(config, backends, mode, lock_file).await {
        Ok(result) => Ok(result),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

async fn startup_inner(
    config: &Config,
    backends: Vec<Arc<dyn DeviceBackend>>,
    mode: ServerMode,
    lock_file: File,
) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.logs_path)?;
    std::fs::create_dir_all(&config.sessions_path)?;

    let state = Arc::new(DaemonState::new(config.clone(), backends, Some(lock_file)));

    let socket = if mode.wants_socket() {
        Some(bind_loopback().await?)
    } else {
        None
    };
    let http = if mode.wants_http() {
        Some(bind_loopback().await?)
    } else {
        None
    };

    let port = listener_port(socket.as_ref());
    let http_port = listener_port(http.as_ref());

    let pid = std::process::id();
    let exe = std::env::current_exe().unwrap_or_default();
    let exe_root = exe.parent().map(PathBuf::from).unwrap_or_default();
    let meta = DaemonMetadata {
        port,
        http_port,
        transport: mode.as_str().to_string(),
        token: state.token.clone(),
        pid,
        process_start_time: process::read_start_time(pid),
        version: crate::VERSION.to_string(),
        code_signature: process::code_signature(&exe, &exe_root),
        state_dir: config.state_dir.clone(),
    };
    metadata::write_metadata(&config.state_dir, &meta)?;

    info!(?port, ?http_port, "daemon started");
    Ok(StartupResult {
        state,
        socket,
        http,
    })
}

async fn bind_loopback() -> Result<TcpListener, LifecycleError> {
    TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| LifecycleError::BindFailed("127.0.0.1:0".to_string(), e))
}

fn listener_port(listener: Option<&TcpListener>) -> Option<u16> {
    listener.and_then(|l| l.local_addr().ok()).map(|a| a.port())
}

/// Startup sweep for strays left by a previous instance.
pub async fn startup_sweep(state: &Arc<DaemonState>) {
    state.sessions.startup_sweep().await;
    let reaped = orphans::sweep_runner_orphans().await;
    if reaped > 0 {
        warn!(reaped, "stopped orphaned runner builds at startup");
    }
}

/// Single-shot graceful drain.
///
/// Order matters: stop runner sessions, close every open session (which
/// stops its recording then its log stream and persists the journal),
/// reap any stragglers LIFO, then release metadata and the lock.
pub async fn shutdown(state: &Arc<DaemonState>) {
    info!("shutting down daemon...");

    crate::runners::stop_all(state).await;

    let names: Vec<String> = state.sessions.list().into_iter().map(|s| s.name).collect();
    for name in names {
        if let Err(e) = crate::pipeline::session_ops::close_session(state, &name, None).await {
            warn!(session = %name, error = %e, "session close failed during drain");
        }
    }

    state.sessions.reap_all_procs().await;

    metadata::remove_metadata(&state.config.state_dir);
    if state.config.lock_path.exists() {
        let _ = std::fs::remove_file(&state.config.lock_path);
    }

    info!("daemon shutdown complete");
}

/// Clean up resources on startup failure.
fn cleanup_on_failure(config: &Config) {
    metadata::remove_metadata(&config.state_dir);
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
