// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use ad_core::Platform;

use crate::lifecycle::LifecycleError;

/// Which servers the daemon brings up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    #[default]
    Socket,
    Http,
    Dual,
}

impl ServerMode {
    pub fn wants_socket(self) -> bool {
        matches!(self, ServerMode::Socket | ServerMode::Dual)
    }

    pub fn wants_http(self) -> bool {
        matches!(self, ServerMode::Http | ServerMode::Dual)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServerMode::Socket => "socket",
            ServerMode::Http => "http",
            ServerMode::Dual => "dual",
        }
    }
}

/// Resolve state directory: AGENT_DEVICE_STATE_DIR > ~/.agent-device
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("AGENT_DEVICE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".agent-device"))
}

pub fn server_mode() -> ServerMode {
    match std::env::var("AGENT_DEVICE_DAEMON_SERVER_MODE").as_deref() {
        Ok("http") => ServerMode::Http,
        Ok("dual") => ServerMode::Dual,
        _ => ServerMode::Socket,
    }
}

fn parse_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

/// Cap on concurrent `ios-simulator` leases; unset means unbounded.
pub fn max_simulator_leases() -> Option<usize> {
    parse_u64("AGENT_DEVICE_MAX_SIMULATOR_LEASES")
        .filter(|&n| n > 0)
        .map(|n| n as usize)
}

pub fn lease_ttl_ms() -> u64 {
    parse_u64("AGENT_DEVICE_LEASE_TTL_MS").unwrap_or(60_000)
}

pub fn lease_min_ttl_ms() -> u64 {
    parse_u64("AGENT_DEVICE_LEASE_MIN_TTL_MS").unwrap_or(5_000)
}

pub fn lease_max_ttl_ms() -> u64 {
    parse_u64("AGENT_DEVICE_LEASE_MAX_TTL_MS").unwrap_or(600_000)
}

/// App-log rotation threshold (default 10 MB).
pub fn app_log_max_bytes() -> u64 {
    parse_u64("AGENT_DEVICE_APP_LOG_MAX_BYTES").unwrap_or(10 * 1024 * 1024)
}

/// Rotated app-log files to keep (default 3).
pub fn app_log_max_files() -> u32 {
    parse_u64("AGENT_DEVICE_APP_LOG_MAX_FILES").unwrap_or(3) as u32
}

pub fn batch_max_steps() -> usize {
    parse_u64("AGENT_DEVICE_BATCH_MAX_STEPS").unwrap_or(50) as usize
}

/// Deep-link template for `trigger-app-event`; the platform-specific
/// variable wins over the generic one.
pub fn app_event_url_template(platform: Platform) -> Option<String> {
    let specific = match platform {
        Platform::Ios => "AGENT_DEVICE_APP_EVENT_IOS_URL_TEMPLATE",
        Platform::Android => "AGENT_DEVICE_APP_EVENT_ANDROID_URL_TEMPLATE",
    };
    std::env::var(specific)
        .or_else(|_| std::env::var("AGENT_DEVICE_APP_EVENT_URL_TEMPLATE"))
        .ok()
        .filter(|s| !s.is_empty())
}

/// Window in which runner sessions are repeatedly signaled to abort
/// after a client disconnect.
pub fn abort_window() -> Duration {
    Duration::from_millis(parse_u64("AGENT_DEVICE_ABORT_WINDOW_MS").unwrap_or(15_000))
}

pub fn abort_poll() -> Duration {
    Duration::from_millis(parse_u64("AGENT_DEVICE_ABORT_POLL_MS").unwrap_or(200))
}

/// Optional HTTP auth hook: an executable path plus the decision key.
pub fn http_auth_hook() -> Option<PathBuf> {
    std::env::var("AGENT_DEVICE_HTTP_AUTH_HOOK")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

pub fn http_auth_export() -> String {
    std::env::var("AGENT_DEVICE_HTTP_AUTH_EXPORT").unwrap_or_else(|_| "default".to_string())
}
