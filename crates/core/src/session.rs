// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session values: a named device binding plus derived handles.

use std::collections::VecDeque;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceDescriptor, Platform};
use crate::envelope::Flags;

/// Journal high-water mark; oldest entries drop first.
pub const JOURNAL_CAP: usize = 2000;

/// App-startup duration samples kept for `perf`.
pub const STARTUP_SAMPLES_CAP: usize = 32;

/// The app a session is currently working against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppContext {
    /// Bundle id (iOS) or package name (Android).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordingKind {
    SimulatorVideo,
    Screenrecord,
}

/// An in-progress screen recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingHandle {
    pub kind: RecordingKind,
    pub output: PathBuf,
    /// On-device path for recordings that must be pulled after stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Process-arena id of the recorder, owned by the session store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStreamState {
    Running,
    Stopped,
}

/// An in-progress app-log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppLogHandle {
    pub backend: Platform,
    pub output: PathBuf,
    pub state: LogStreamState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc: Option<u64>,
}

/// One journaled action, replayable through the script codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub flags: Flags,
    pub ok: bool,
    pub at_ms: u64,
}

/// A named, device-bound unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub name: String,
    pub device: DeviceDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording: Option<RecordingHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_log: Option<AppLogHandle>,
    #[serde(default)]
    pub journal: VecDeque<ActionRecord>,
    #[serde(default)]
    pub startup_ms: VecDeque<u64>,
    /// Most recent snapshot text, kept for `diff`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_snapshot: Option<String>,
    /// Trace log destination while a trace is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_log: Option<PathBuf>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Session {
    pub fn new(name: impl Into<String>, device: DeviceDescriptor, now_ms: u64) -> Self {
        Self {
            name: name.into(),
            device,
            app: None,
            recording: None,
            app_log: None,
            journal: VecDeque::new(),
            startup_ms: VecDeque::new(),
            last_snapshot: None,
            trace_log: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Append to the journal, dropping the oldest entry past the cap.
    pub fn record(&mut self, action: ActionRecord) {
        self.updated_at_ms = action.at_ms;
        self.journal.push_back(action);
        while self.journal.len() > JOURNAL_CAP {
            self.journal.pop_front();
        }
    }

    pub fn push_startup_sample(&mut self, duration_ms: u64) {
        self.startup_ms.push_back(duration_ms);
        while self.startup_ms.len() > STARTUP_SAMPLES_CAP {
            self.startup_ms.pop_front();
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
