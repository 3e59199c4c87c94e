// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Platform backends for device tooling.
//!
//! Each backend turns a high-level command into vendor-tool invocations
//! (`xcrun simctl`, `xcrun devicectl`, `adb`). The daemon treats them as
//! opaque: commands go in, structured JSON comes out.

pub mod android;
pub mod ios;
pub mod orphans;
pub mod process;
pub mod subprocess;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackend, FakeCall};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use ad_core::{
    CancelFlag, DaemonError, DeviceDescriptor, Flags, Platform, RecordingKind, Selector,
};

pub use android::AndroidBackend;
pub use ios::IosBackend;

/// The command a backend is asked to carry out.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
    pub flags: Flags,
}

impl Invocation {
    pub fn new(command: impl Into<String>, args: Vec<String>, flags: Flags) -> Self {
        Self {
            command: command.into(),
            args,
            flags,
        }
    }
}

/// Per-request context handed to backends.
#[derive(Debug, Clone)]
pub struct ExecCtx {
    pub daemon_log: PathBuf,
    pub debug: bool,
    /// Output path requested via the `out` flag, if any.
    pub out: Option<PathBuf>,
    /// Bundle/package id of the active session's app.
    pub bundle_id: Option<String>,
    pub trace_log: Option<PathBuf>,
    pub request_id: String,
    pub cancel: CancelFlag,
}

impl ExecCtx {
    pub fn ensure_not_canceled(&self) -> Result<(), DaemonError> {
        if self.cancel.is_canceled() {
            Err(DaemonError::canceled())
        } else {
            Ok(())
        }
    }
}

/// A spawned recorder plus what is needed to finalize it.
pub struct RecordingProc {
    pub child: tokio::process::Child,
    pub kind: RecordingKind,
    pub remote: Option<String>,
}

/// A concrete platform implementation invoked by the dispatcher.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    fn platform(&self) -> Platform;

    /// Devices visible within the selector's scope.
    async fn discover(&self, selector: &Selector) -> Result<Vec<DeviceDescriptor>, DaemonError>;

    /// Boot the device (no-op when already booted).
    async fn boot(
        &self,
        device: &DeviceDescriptor,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError>;

    /// Run one command against the device.
    async fn run(
        &self,
        device: &DeviceDescriptor,
        invocation: &Invocation,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError>;

    /// Start the long-running UI-automation host for a device.
    ///
    /// `None` means this platform's UI commands are self-contained and
    /// no runner session needs supervising.
    async fn start_runner(
        &self,
        _device: &DeviceDescriptor,
    ) -> Result<Option<tokio::process::Child>, DaemonError> {
        Ok(None)
    }

    /// Spawn a screen recorder writing (eventually) to `output`.
    async fn start_recording(
        &self,
        device: &DeviceDescriptor,
        output: &Path,
    ) -> Result<RecordingProc, DaemonError>;

    /// Finalize a recording started by [`DeviceBackend::start_recording`].
    async fn stop_recording(
        &self,
        device: &DeviceDescriptor,
        child: &mut tokio::process::Child,
        remote: Option<&str>,
        output: &Path,
    ) -> Result<Value, DaemonError>;

    /// Spawn a log streamer for the app, writing to `output`.
    async fn start_app_log(
        &self,
        device: &DeviceDescriptor,
        bundle_id: Option<&str>,
        output: &Path,
    ) -> Result<tokio::process::Child, DaemonError>;
}

impl std::fmt::Debug for dyn DeviceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeviceBackend").field(&self.platform()).finish()
    }
}
