// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of active iOS runner sessions.
//!
//! A runner session is the per-device UI-automation host (the
//! `idb_companion` the backend's one-shot UI commands attach to). It
//! outlives individual requests, so the daemon supervises it: spawned
//! lazily on the first UI command for a device, interrupted on client
//! disconnect, stopped at shutdown, respawned on next use.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use ad_backends::process;
use ad_core::{CancelFlag, DaemonError, DeviceDescriptor, Platform};

use crate::cancel::CancelRegistry;
use crate::DaemonState;

/// One supervised runner host, keyed by its device id.
pub struct RunnerHandle {
    pub device_id: String,
    pub pid: Option<u32>,
    /// Process-arena id; the session store owns the child.
    pub proc: Option<u64>,
    pub abort: CancelFlag,
}

#[derive(Default)]
pub struct RunnerRegistry {
    inner: Mutex<HashMap<String, RunnerHandle>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device_id: &str, pid: Option<u32>, proc: Option<u64>) -> CancelFlag {
        let abort = CancelFlag::new();
        self.inner.lock().insert(
            device_id.to_string(),
            RunnerHandle {
                device_id: device_id.to_string(),
                pid,
                proc,
                abort: abort.clone(),
            },
        );
        abort
    }

    pub fn remove(&self, device_id: &str) -> Option<RunnerHandle> {
        self.inner.lock().remove(device_id)
    }

    /// Registered and not yet signaled to abort.
    pub fn is_live(&self, device_id: &str) -> bool {
        self.inner
            .lock()
            .get(device_id)
            .is_some_and(|h| !h.abort.is_canceled())
    }

    pub fn abort_flag(&self, device_id: &str) -> Option<CancelFlag> {
        self.inner.lock().get(device_id).map(|h| h.abort.clone())
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Signal every registered runner to abort: the flag for pollers,
    /// an interrupt for the host process itself.
    pub fn signal_abort_all(&self) {
        for (device_id, handle) in self.inner.lock().iter() {
            debug!(device_id = %device_id, "signaling runner abort");
            handle.abort.cancel();
            if let Some(pid) = handle.pid {
                process::signal(pid, "-2");
            }
        }
    }

    /// Drain the registry; used by the shutdown path to reap hosts.
    pub fn take_all(&self) -> Vec<RunnerHandle> {
        self.inner.lock().drain().map(|(_, handle)| handle).collect()
    }
}

/// Commands that go through the device's UI-automation host.
pub fn needs_runner(command: &str) -> bool {
    matches!(
        command,
        "snapshot"
            | "diff"
            | "find"
            | "is"
            | "get"
            | "press"
            | "longpress"
            | "swipe"
            | "scroll"
            | "scrollintoview"
            | "focus"
            | "type"
            | "fill"
            | "pinch"
            | "back"
            | "home"
            | "app-switcher"
            | "wait"
            | "alert"
    )
}

/// Make sure the device's runner host is up before a UI command runs.
///
/// An aborted host is reaped and replaced; platforms whose backend
/// returns no runner are a no-op.
pub async fn ensure_runner(
    state: &DaemonState,
    device: &DeviceDescriptor,
) -> Result<(), DaemonError> {
    if device.platform != Platform::Ios {
        return Ok(());
    }
    if state.runners.is_live(&device.id) {
        return Ok(());
    }

    if let Some(old) = state.runners.remove(&device.id) {
        if let Some(proc_id) = old.proc {
            state.sessions.reap_proc(proc_id).await;
        }
    }

    let backend = state.dispatcher.backend_for(device.platform)?;
    let Some(child) = backend.start_runner(device).await? else {
        return Ok(());
    };
    let pid = child.id();
    let proc_id = state.sessions.store_proc(child);
    state.runners.register(&device.id, pid, Some(proc_id));
    info!(device = %device.id, ?pid, "runner session registered");
    Ok(())
}

/// Stop and reap every runner session; the shutdown drain calls this
/// before sessions close.
pub async fn stop_all(state: &DaemonState) {
    state.runners.signal_abort_all();
    for handle in state.runners.take_all() {
        if let Some(proc_id) = handle.proc {
            state.sessions.reap_proc(proc_id).await;
        }
    }
}

/// Repeatedly signal runner aborts until the given request ids drain.
///
/// Polls every `poll` up to `window` total (defaults 200ms x 15s).
pub async fn drain_in_flight(
    runners: &RunnerRegistry,
    cancels: &CancelRegistry,
    request_ids: &[String],
) {
    let window = crate::env::abort_window();
    let poll = crate::env::abort_poll();
    let started = Instant::now();

    loop {
        if runners.active_count() > 0 {
            runners.signal_abort_all();
        }
        let in_flight = request_ids.iter().filter(|id| cancels.is_active(id)).count();
        if in_flight == 0 {
            return;
        }
        if started.elapsed() >= window {
            debug!(in_flight, "abort window elapsed with requests still in flight");
            return;
        }
        tokio::time::sleep(poll).await;
    }
}
