// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake device backend for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use ad_core::{
    DaemonError, DeviceDescriptor, DeviceKind, Platform, RecordingKind, Selector, TargetClass,
};

use crate::{DeviceBackend, ExecCtx, Invocation, RecordingProc};

/// Recorded backend call
#[derive(Debug, Clone)]
pub struct FakeCall {
    pub command: String,
    pub args: Vec<String>,
    pub device: String,
}

struct FakeState {
    devices: Vec<DeviceDescriptor>,
    results: HashMap<String, Result<Value, DaemonError>>,
    calls: Vec<FakeCall>,
    delay: Option<Duration>,
    runners_started: usize,
}

/// Fake device backend: scripted results, recorded calls.
#[derive(Clone)]
pub struct FakeBackend {
    platform: Platform,
    inner: Arc<Mutex<FakeState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    /// iOS-simulator fake with one booted iPhone.
    pub fn new() -> Self {
        Self::with_devices(vec![DeviceDescriptor {
            platform: Platform::Ios,
            id: "FAKE-UDID-1".into(),
            name: "iPhone 16".into(),
            kind: DeviceKind::Simulator,
            target: TargetClass::Mobile,
            booted: true,
            sim_set: None,
        }])
    }

    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let platform = devices
            .first()
            .map(|d| d.platform)
            .unwrap_or(Platform::Ios);
        Self {
            platform,
            inner: Arc::new(Mutex::new(FakeState {
                devices,
                results: HashMap::new(),
                calls: Vec::new(),
                delay: None,
                runners_started: 0,
            })),
        }
    }

    pub fn push_device(&self, device: DeviceDescriptor) {
        self.inner.lock().devices.push(device);
    }

    /// Script the result for a command.
    pub fn set_result(&self, command: &str, result: Value) {
        self.inner.lock().results.insert(command.to_string(), Ok(result));
    }

    /// Script a failure for a command.
    pub fn fail_with(&self, command: &str, error: DaemonError) {
        self.inner
            .lock()
            .results
            .insert(command.to_string(), Err(error));
    }

    /// Make every `run` call take this long (cancellation tests).
    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.inner.lock().calls.clone()
    }

    pub fn commands_run(&self) -> Vec<String> {
        self.inner.lock().calls.iter().map(|c| c.command.clone()).collect()
    }

    /// How many runner hosts this backend has spawned.
    pub fn runners_started(&self) -> usize {
        self.inner.lock().runners_started
    }
}

#[async_trait]
impl DeviceBackend for FakeBackend {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn discover(&self, selector: &Selector) -> Result<Vec<DeviceDescriptor>, DaemonError> {
        Ok(self
            .inner
            .lock()
            .devices
            .iter()
            .filter(|d| selector.matches(d))
            .cloned()
            .collect())
    }

    async fn boot(
        &self,
        device: &DeviceDescriptor,
        _ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        self.inner.lock().calls.push(FakeCall {
            command: "boot".into(),
            args: vec![],
            device: device.id.clone(),
        });
        Ok(json!({"booted": device.id}))
    }

    async fn run(
        &self,
        device: &DeviceDescriptor,
        invocation: &Invocation,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        let delay = {
            let mut state = self.inner.lock();
            state.calls.push(FakeCall {
                command: invocation.command.clone(),
                args: invocation.args.clone(),
                device: device.id.clone(),
            });
            state.delay
        };

        if let Some(delay) = delay {
            let deadline = std::time::Instant::now() + delay;
            while std::time::Instant::now() < deadline {
                if ctx.cancel.is_canceled() {
                    return Err(DaemonError::canceled());
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        ctx.ensure_not_canceled()?;

        if let Some(result) = self.inner.lock().results.get(&invocation.command) {
            return result.clone();
        }
        Ok(json!({"command": invocation.command, "device": device.id}))
    }

    async fn start_runner(
        &self,
        _device: &DeviceDescriptor,
    ) -> Result<Option<tokio::process::Child>, DaemonError> {
        self.inner.lock().runners_started += 1;
        let child = tokio::process::Command::new("sleep")
            .arg("3600")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::command_failed(format!("fake runner: {e}")))?;
        Ok(Some(child))
    }

    async fn start_recording(
        &self,
        _device: &DeviceDescriptor,
        output: &Path,
    ) -> Result<RecordingProc, DaemonError> {
        if let Some(parent) = output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(output, b"");
        let child = tokio::process::Command::new("sleep")
            .arg("3600")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::command_failed(format!("fake recorder: {e}")))?;
        Ok(RecordingProc {
            child,
            kind: RecordingKind::SimulatorVideo,
            remote: None,
        })
    }

    async fn stop_recording(
        &self,
        _device: &DeviceDescriptor,
        child: &mut tokio::process::Child,
        _remote: Option<&str>,
        output: &Path,
    ) -> Result<Value, DaemonError> {
        let _ = child.start_kill();
        let _ = child.wait().await;
        Ok(json!({"path": output.to_string_lossy(), "bytes": 0}))
    }

    async fn start_app_log(
        &self,
        _device: &DeviceDescriptor,
        _bundle_id: Option<&str>,
        output: &Path,
    ) -> Result<tokio::process::Child, DaemonError> {
        if let Some(parent) = output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(output, b"");
        tokio::process::Command::new("sleep")
            .arg("3600")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::command_failed(format!("fake streamer: {e}")))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
