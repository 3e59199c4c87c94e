// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording and trace operations.

use serde_json::{json, Value};
use tracing::info;

use ad_core::{DaemonError, RecordingHandle, Request};

use super::{session_ops, HandlerCtx};

pub async fn handle(ctx: &HandlerCtx<'_>, req: &Request) -> Option<Result<Value, DaemonError>> {
    match req.command.as_str() {
        "record" => Some(record(ctx, req).await),
        "trace" => Some(trace(ctx, req)),
        _ => None,
    }
}

async fn record(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    match req.args.first().map(String::as_str) {
        Some("start") => record_start(ctx, req).await,
        Some("stop") => record_stop(ctx, req).await,
        _ => Err(DaemonError::invalid_args("record requires start or stop")),
    }
}

async fn record_start(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let state = ctx.state;
    let session = state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?;
    if session.recording.is_some() {
        return Err(DaemonError::invalid_args("a recording is already running"));
    }

    let output = req
        .flags
        .get_path("out")
        .unwrap_or_else(|| session_ops::recording_path(state, &req.session));

    let backend = state.dispatcher.backend_for(session.device.platform)?;
    let proc = backend.start_recording(&session.device, &output).await?;
    let proc_id = state.sessions.store_proc(proc.child);

    let handle = RecordingHandle {
        kind: proc.kind,
        output: output.clone(),
        remote: proc.remote,
        proc: Some(proc_id),
    };
    state
        .sessions
        .update(&req.session, |s| s.recording = Some(handle.clone()))?;
    info!(session = %req.session, path = %output.display(), "recording started");
    Ok(json!({"recording": true, "path": output}))
}

async fn record_stop(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let state = ctx.state;
    let session = state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?;
    let Some(recording) = session.recording.clone() else {
        return Err(DaemonError::invalid_args("no recording is running"));
    };

    let mut result = json!({"path": recording.output});
    if let Some(proc_id) = recording.proc {
        if let Some(mut child) = state.sessions.take_proc(proc_id) {
            let backend = state.dispatcher.backend_for(session.device.platform)?;
            result = backend
                .stop_recording(
                    &session.device,
                    &mut child,
                    recording.remote.as_deref(),
                    &recording.output,
                )
                .await?;
        }
    }

    state.sessions.update(&req.session, |s| s.recording = None)?;
    info!(session = %req.session, "recording stopped");
    Ok(result)
}

/// Trace capture toggles a per-session trace-log destination that the
/// execution context hands to backends.
fn trace(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let state = ctx.state;
    match req.args.first().map(String::as_str) {
        Some("start") => {
            let path = state
                .sessions
                .session_dir(&req.session)
                .join(format!("trace-{}.log", state.sessions.now_ms()));
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            state
                .sessions
                .update(&req.session, |s| s.trace_log = Some(path.clone()))?;
            Ok(json!({"tracing": true, "path": path}))
        }
        Some("stop") => {
            let path = state
                .sessions
                .update(&req.session, |s| s.trace_log.take())?;
            Ok(json!({"tracing": false, "path": path}))
        }
        _ => Err(DaemonError::invalid_args("trace requires start or stop")),
    }
}
