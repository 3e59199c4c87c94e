// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatcher: device selection and backend routing.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use ad_backends::{DeviceBackend, ExecCtx, Invocation};
use ad_core::{
    command_supported, CancelFlag, DaemonError, DeviceDescriptor, ErrorCode, Platform, Request,
    Selector, Session,
};

pub struct Dispatcher {
    backends: Vec<Arc<dyn DeviceBackend>>,
    daemon_log: PathBuf,
}

impl Dispatcher {
    pub fn new(backends: Vec<Arc<dyn DeviceBackend>>, daemon_log: PathBuf) -> Self {
        Self {
            backends,
            daemon_log,
        }
    }

    pub fn backend_for(&self, platform: Platform) -> Result<&Arc<dyn DeviceBackend>, DaemonError> {
        self.backends
            .iter()
            .find(|b| b.platform() == platform)
            .ok_or_else(|| {
                DaemonError::new(
                    ErrorCode::UnsupportedPlatform,
                    format!("no backend for platform '{}'", platform.as_str()),
                )
            })
    }

    /// All devices visible within the selector's scope.
    ///
    /// A backend whose tooling is missing is skipped unless its platform
    /// was explicitly requested; a machine without the Android SDK can
    /// still drive simulators.
    pub async fn discover(&self, selector: &Selector) -> Result<Vec<DeviceDescriptor>, DaemonError> {
        let mut devices = Vec::new();
        for backend in &self.backends {
            if selector.platform.is_some_and(|p| p != backend.platform()) {
                continue;
            }
            match backend.discover(selector).await {
                Ok(found) => {
                    devices.extend(found.into_iter().filter(|d| selector.matches(d)));
                }
                Err(e) if e.code == ErrorCode::ToolMissing => {
                    if selector.platform == Some(backend.platform()) {
                        return Err(e);
                    }
                    debug!(platform = backend.platform().as_str(), "tooling missing, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(devices)
    }

    /// Pick the device a new session should bind.
    ///
    /// Preference order: booted devices first, then discovery order. A
    /// selector that matches nothing in its scope is DEVICE_NOT_FOUND;
    /// there is no fallback to host-global discovery.
    pub async fn select_device(&self, selector: &Selector) -> Result<DeviceDescriptor, DaemonError> {
        let devices = self.discover(selector).await?;
        devices
            .iter()
            .find(|d| d.booted)
            .or_else(|| devices.first())
            .cloned()
            .ok_or_else(|| {
                DaemonError::device_not_found("no device matches the selector")
                    .with_details(json!({
                        "platform": selector.platform.map(Platform::as_str),
                        "device": selector.device_name,
                        "udid": selector.udid,
                        "serial": selector.serial,
                    }))
            })
    }

    /// Build the execution context for one backend call.
    pub fn exec_ctx(
        &self,
        request: &Request,
        session: Option<&Session>,
        request_id: &str,
        cancel: CancelFlag,
    ) -> ExecCtx {
        ExecCtx {
            daemon_log: self.daemon_log.clone(),
            debug: request.meta.debug || request.flags.get_bool("debug"),
            out: request.flags.get_path("out"),
            bundle_id: session.and_then(|s| s.app.as_ref().map(|a| a.id.clone())),
            trace_log: session.and_then(|s| s.trace_log.clone()),
            request_id: request_id.to_string(),
            cancel,
        }
    }

    /// Capability-check then run a command on the session's device.
    pub async fn execute(
        &self,
        session: &Session,
        request: &Request,
        request_id: &str,
        cancel: CancelFlag,
    ) -> Result<Value, DaemonError> {
        let device = &session.device;
        if !command_supported(&request.command, device.platform, device.kind) {
            return Err(DaemonError::unsupported_operation(
                &request.command,
                &device.describe(),
            ));
        }
        let backend = self.backend_for(device.platform)?;
        let ctx = self.exec_ctx(request, Some(session), request_id, cancel);
        let invocation = Invocation::new(
            request.command.clone(),
            request.args.clone(),
            request.flags.clone(),
        );
        backend.run(device, &invocation, &ctx).await
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
