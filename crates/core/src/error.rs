// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy and normalization for daemon responses.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::redact;

/// Closed set of error codes carried on every failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgs,
    DeviceNotFound,
    DeviceInUse,
    ToolMissing,
    AppNotInstalled,
    UnsupportedPlatform,
    UnsupportedOperation,
    CommandFailed,
    SessionNotFound,
    Unauthorized,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgs => "INVALID_ARGS",
            ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
            ErrorCode::DeviceInUse => "DEVICE_IN_USE",
            ErrorCode::ToolMissing => "TOOL_MISSING",
            ErrorCode::AppNotInstalled => "APP_NOT_INSTALLED",
            ErrorCode::UnsupportedPlatform => "UNSUPPORTED_PLATFORM",
            ErrorCode::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            ErrorCode::CommandFailed => "COMMAND_FAILED",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Fallback hint supplied during normalization when a handler gave none.
    pub fn default_hint(self) -> Option<&'static str> {
        match self {
            ErrorCode::InvalidArgs => Some("Check command arguments and run --help."),
            ErrorCode::DeviceNotFound => {
                Some("Run 'devices' to list what is visible in the current scope.")
            }
            ErrorCode::DeviceInUse => Some("Close the session holding this device first."),
            ErrorCode::ToolMissing => {
                Some("Install the platform tooling (Xcode command line tools or Android SDK).")
            }
            ErrorCode::AppNotInstalled => Some("Run 'apps' to list installed applications."),
            ErrorCode::SessionNotFound => Some("Open an app first to create a session."),
            ErrorCode::Unauthorized => Some("Check the token and lease scope for this request."),
            ErrorCode::UnsupportedOperation => {
                Some("This command is not available on the selected device class.")
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The daemon-side error carried in the response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl DaemonError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
            diagnostic_id: None,
            log_path: None,
            details: None,
        }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgs, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CommandFailed, message)
    }

    pub fn session_not_found(session: &str) -> Self {
        Self::new(
            ErrorCode::SessionNotFound,
            format!("no active session named '{session}'"),
        )
    }

    pub fn device_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceNotFound, message)
    }

    pub fn device_in_use(device: &str, session: &str) -> Self {
        Self::new(
            ErrorCode::DeviceInUse,
            format!("device '{device}' is bound to session '{session}'"),
        )
    }

    pub fn tool_missing(tool: &str) -> Self {
        Self::new(ErrorCode::ToolMissing, format!("required tool '{tool}' not found"))
    }

    pub fn unsupported_operation(command: &str, device: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedOperation,
            format!("command '{command}' is not supported on {device}"),
        )
    }

    pub fn canceled() -> Self {
        Self::command_failed("request canceled")
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Normalize the error before it leaves the daemon.
    ///
    /// Redacts secret-looking detail values, lifts `hint`/`diagnosticId`/
    /// `logPath` out of the details map, drops an empty details map,
    /// rewrites a generic subprocess failure message from stderr, and
    /// fills in a default hint for the code.
    pub fn normalize(mut self) -> Self {
        if let Some(details) = self.details.as_mut() {
            redact::redact_value(details);

            if let Some(map) = details.as_object_mut() {
                if let Some(hint) = map.remove("hint").and_then(string_value) {
                    self.hint.get_or_insert(hint);
                }
                if let Some(id) = map.remove("diagnosticId").and_then(string_value) {
                    self.diagnostic_id.get_or_insert(id);
                }
                if let Some(path) = map.remove("logPath").and_then(string_value) {
                    self.log_path.get_or_insert(PathBuf::from(path));
                }
            }
        }

        if self.code == ErrorCode::CommandFailed {
            if let Some(line) = self.details.as_ref().and_then(stderr_summary) {
                self.message = line;
            }
        }

        if self
            .details
            .as_ref()
            .and_then(|d| d.as_object())
            .is_some_and(|m| m.is_empty())
        {
            self.details = None;
        }

        if self.hint.is_none() {
            self.hint = self.code.default_hint().map(String::from);
        }

        self
    }
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for DaemonError {}

fn string_value(v: serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

/// Stderr prefixes that carry no information about the actual failure.
const BOILERPLATE_PREFIXES: &[&str] = &[
    "warning:",
    "note:",
    "objc[",
    "* daemon not running",
    "* daemon started successfully",
    "An error was encountered processing the command",
];

const MESSAGE_LIMIT: usize = 200;

/// First informative stderr line from a direct subprocess failure.
///
/// Only applies when the details carry both `stderr` and `exitCode`,
/// which marks the failure as a raw tool exit rather than a message a
/// handler already composed.
fn stderr_summary(details: &serde_json::Value) -> Option<String> {
    let map = details.as_object()?;
    map.get("exitCode")?;
    let stderr = map.get("stderr")?.as_str()?;

    let line = stderr.lines().map(str::trim).find(|line| {
        !line.is_empty()
            && !BOILERPLATE_PREFIXES
                .iter()
                .any(|prefix| line.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()))
    })?;

    let mut summary = line.to_string();
    if summary.len() > MESSAGE_LIMIT {
        let mut end = MESSAGE_LIMIT;
        while !summary.is_char_boundary(end) {
            end -= 1;
        }
        summary.truncate(end);
    }
    Some(summary)
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
