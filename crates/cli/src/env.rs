// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Per-request timeout enforced client-side.
pub fn request_timeout() -> Duration {
    parse_duration_ms("AGENT_DEVICE_DAEMON_TIMEOUT_MS").unwrap_or(Duration::from_secs(90))
}

/// Window to wait for a freshly launched daemon's metadata.
pub fn startup_timeout() -> Duration {
    parse_duration_ms("AGENT_DEVICE_STARTUP_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

/// Poll interval while waiting for startup.
pub fn startup_poll() -> Duration {
    parse_duration_ms("AGENT_DEVICE_STARTUP_POLL_MS").unwrap_or(Duration::from_millis(100))
}

/// Timeout for stopping a predecessor daemon politely.
pub fn stop_timeout() -> Duration {
    parse_duration_ms("AGENT_DEVICE_STOP_TIMEOUT_MS").unwrap_or(Duration::from_secs(2))
}

/// Client transport preference: auto (default), socket, or http.
pub fn transport_preference() -> String {
    std::env::var("AGENT_DEVICE_DAEMON_TRANSPORT").unwrap_or_else(|_| "auto".to_string())
}

/// Explicit daemon binary override.
pub fn daemon_binary() -> Option<String> {
    std::env::var("AGENT_DEVICE_DAEMON_BINARY").ok().filter(|s| !s.is_empty())
}

/// Whether a timed-out daemon gets SIGKILLed and reset (CI behavior).
pub fn reset_on_timeout() -> bool {
    std::env::var("AGENT_DEVICE_RESET_ON_TIMEOUT")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

pub fn state_dir_override() -> Option<String> {
    std::env::var("AGENT_DEVICE_STATE_DIR").ok()
}
