// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session operations: open/close, listing, boot, logs, perf, and the
//! session-scoped passthrough commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{info, warn};

use ad_backends::{orphans, Invocation};
use ad_core::{
    AppContext, AppLogHandle, DaemonError, LogStreamState, Request, Selector, Session,
};

use crate::diagnostics::DiagScope;
use crate::DaemonState;

use super::{batch, dispatch_for_session, replay, HandlerCtx};

pub async fn handle(
    ctx: &HandlerCtx<'_>,
    req: &Request,
    scope: &mut DiagScope,
) -> Option<Result<Value, DaemonError>> {
    match req.command.as_str() {
        "open" => Some(open(ctx, req, scope).await),
        "close" => Some(close(ctx, req).await),
        "session_list" => Some(session_list(ctx)),
        "devices" => Some(devices(ctx, req).await),
        "boot" => Some(boot(ctx, req).await),
        "batch" => Some(batch::run(ctx, req).await),
        "replay" => Some(replay::run(ctx, req).await),
        "logs" => Some(logs(ctx, req).await),
        "perf" => Some(perf(ctx, req)),
        "trigger-app-event" => Some(trigger_app_event(ctx, req).await),
        "clipboard" | "appstate" | "apps" | "screenshot" | "reinstall" | "push" | "network" => {
            Some(dispatch_for_session(ctx, req).await)
        }
        _ => None,
    }
}

/// Open an app, creating and device-binding the session if needed.
async fn open(
    ctx: &HandlerCtx<'_>,
    req: &Request,
    scope: &mut DiagScope,
) -> Result<Value, DaemonError> {
    let state = ctx.state;
    let created;
    let session = match state.sessions.get(&req.session) {
        Some(session) => {
            created = false;
            session
        }
        None => {
            let selector = Selector::from_flags(&req.flags)?;
            let device = scope
                .time("select_device", state.dispatcher.select_device(&selector))
                .await?;
            let session = Session::new(req.session.clone(), device, state.sessions.now_ms());
            state.sessions.insert(session.clone())?;
            created = true;
            session
        }
    };

    // App context comes from the positional; resolving a display name to
    // a bundle/package id is the backend's business during launch.
    let mut session = session;
    if let Some(app) = req.args.first() {
        session.app = Some(AppContext {
            id: app.clone(),
            name: None,
        });
        let app_ctx = session.app.clone();
        let _ = state.sessions.update(&req.session, |s| s.app = app_ctx);
    }

    let started = Instant::now();
    let launch = state
        .dispatcher
        .execute(&session, req, &ctx.request_id, ctx.cancel.clone())
        .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let result = match launch {
        Ok(result) => result,
        Err(e) => {
            // A failed open must not leave a half-bound session behind
            if created {
                state.sessions.remove(&req.session);
            }
            return Err(e);
        }
    };

    info!(session = %req.session, duration_ms, "app opened");
    Ok(json!({
        "session": req.session,
        "device": session.device,
        "app": session.app,
        "startup": {"durationMs": duration_ms},
        "result": result,
    }))
}

async fn close(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let save_script = req.flags.get_path("saveScript");
    close_session(ctx.state, &req.session, save_script.as_deref()).await
}

/// Close a session: stop the recording, then the log stream, persist
/// the journal, and drop the entry. Also used by the shutdown drain.
pub async fn close_session(
    state: &Arc<DaemonState>,
    name: &str,
    save_script: Option<&std::path::Path>,
) -> Result<Value, DaemonError> {
    let session = state
        .sessions
        .get(name)
        .ok_or_else(|| DaemonError::session_not_found(name))?;

    let mut recording_result = Value::Null;
    if let Some(recording) = &session.recording {
        if let Some(proc_id) = recording.proc {
            if let Some(mut child) = state.sessions.take_proc(proc_id) {
                match state.dispatcher.backend_for(session.device.platform) {
                    Ok(backend) => {
                        match backend
                            .stop_recording(
                                &session.device,
                                &mut child,
                                recording.remote.as_deref(),
                                &recording.output,
                            )
                            .await
                        {
                            Ok(result) => recording_result = result,
                            Err(e) => {
                                warn!(session = name, error = %e, "recording stop failed");
                            }
                        }
                    }
                    Err(_) => {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                }
            }
        }
    }

    if let Some(app_log) = &session.app_log {
        if let Some(proc_id) = app_log.proc {
            state.sessions.reap_proc(proc_id).await;
        }
        orphans::clear_pid(&app_log.output);
    }

    let script = state.sessions.write_session_log(&session, save_script)?;
    state.sessions.remove(name);
    info!(session = name, "session closed");

    Ok(json!({
        "closed": name,
        "script": script,
        "recording": recording_result,
    }))
}

fn session_list(ctx: &HandlerCtx<'_>) -> Result<Value, DaemonError> {
    let sessions: Vec<Value> = ctx
        .state
        .sessions
        .list()
        .into_iter()
        .map(|s| {
            json!({
                "name": s.name,
                "device": s.device,
                "app": s.app,
                "recording": s.recording.as_ref().map(|r| r.kind),
                "appLog": s.app_log.as_ref().map(|l| l.state),
                "journalLen": s.journal.len(),
                "createdAtMs": s.created_at_ms,
                "updatedAtMs": s.updated_at_ms,
            })
        })
        .collect();
    Ok(json!({"sessions": sessions}))
}

async fn devices(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let selector = Selector::from_flags(&req.flags)?;
    let devices = ctx.state.dispatcher.discover(&selector).await?;
    Ok(json!({"devices": devices}))
}

async fn boot(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let state = ctx.state;
    let (device, session) = match state.sessions.get(&req.session) {
        Some(session) => (session.device.clone(), Some(session)),
        None => {
            let selector = Selector::from_flags(&req.flags)?;
            (state.dispatcher.select_device(&selector).await?, None)
        }
    };
    let backend = state.dispatcher.backend_for(device.platform)?;
    let exec_ctx =
        state
            .dispatcher
            .exec_ctx(req, session.as_ref(), &ctx.request_id, ctx.cancel.clone());
    let result = backend.boot(&device, &exec_ctx).await?;

    // The booted flag on a bound session device is now stale
    if session.is_some() {
        let _ = state.sessions.update(&req.session, |s| s.device.booted = true);
    }
    Ok(result)
}

/// App-log stream management: `logs start`, `logs stop`, `logs`.
async fn logs(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let state = ctx.state;
    let session = state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?;
    let log_path = state.sessions.app_log_path(&req.session);

    match req.args.first().map(String::as_str) {
        Some("start") => {
            if session
                .app_log
                .as_ref()
                .is_some_and(|l| l.state == LogStreamState::Running)
            {
                return Err(DaemonError::invalid_args("app log stream already running"));
            }
            state.sessions.rotate_app_log(&req.session);
            let backend = state.dispatcher.backend_for(session.device.platform)?;
            let bundle = session.app.as_ref().map(|a| a.id.clone());
            let child = backend
                .start_app_log(&session.device, bundle.as_deref(), &log_path)
                .await?;
            if let Some(pid) = child.id() {
                orphans::stash_pid(&log_path, pid);
            }
            let proc_id = state.sessions.store_proc(child);
            let handle = AppLogHandle {
                backend: session.device.platform,
                output: log_path.clone(),
                state: LogStreamState::Running,
                proc: Some(proc_id),
            };
            state
                .sessions
                .update(&req.session, |s| s.app_log = Some(handle.clone()))?;
            Ok(json!({"streaming": true, "path": log_path}))
        }
        Some("stop") => {
            let Some(app_log) = session.app_log else {
                return Err(DaemonError::invalid_args("no app log stream is running"));
            };
            if let Some(proc_id) = app_log.proc {
                state.sessions.reap_proc(proc_id).await;
            }
            orphans::clear_pid(&app_log.output);
            state.sessions.update(&req.session, |s| {
                if let Some(log) = s.app_log.as_mut() {
                    log.state = LogStreamState::Stopped;
                    log.proc = None;
                }
            })?;
            Ok(json!({"streaming": false, "path": app_log.output}))
        }
        _ => {
            let bytes = log_path.metadata().map(|m| m.len()).unwrap_or(0);
            Ok(json!({
                "path": log_path,
                "exists": log_path.exists(),
                "bytes": bytes,
                "streaming": session
                    .app_log
                    .as_ref()
                    .is_some_and(|l| l.state == LogStreamState::Running),
            }))
        }
    }
}

/// Startup-duration statistics from the `open` sample ring.
fn perf(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let session = ctx
        .state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?;
    let samples: Vec<u64> = session.startup_ms.iter().copied().collect();
    if samples.is_empty() {
        return Ok(json!({"startup": {"count": 0, "samples": []}}));
    }
    let min = samples.iter().copied().min().unwrap_or(0);
    let max = samples.iter().copied().max().unwrap_or(0);
    let mean = samples.iter().sum::<u64>() / samples.len() as u64;
    Ok(json!({
        "startup": {
            "count": samples.len(),
            "minMs": min,
            "maxMs": max,
            "meanMs": mean,
            "samples": samples,
        }
    }))
}

/// Resolve the deep-link template and open it on the device.
async fn trigger_app_event(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let state = ctx.state;
    let session = state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?;
    let event = req
        .args
        .first()
        .ok_or_else(|| DaemonError::invalid_args("trigger-app-event requires an event name"))?;
    let payload = req
        .flags
        .get_str("payload")
        .map(String::from)
        .or_else(|| req.args.get(1).cloned())
        .unwrap_or_default();

    let platform = session.device.platform;
    let template = crate::env::app_event_url_template(platform).ok_or_else(|| {
        DaemonError::invalid_args("no app-event URL template configured")
            .with_hint("Set AGENT_DEVICE_APP_EVENT_URL_TEMPLATE (or a platform-specific variant).")
    })?;
    let url = template
        .replace("{event}", event)
        .replace("{payload}", &payload)
        .replace("{platform}", platform.as_str());

    let backend = state.dispatcher.backend_for(platform)?;
    let exec_ctx =
        state
            .dispatcher
            .exec_ctx(req, Some(&session), &ctx.request_id, ctx.cancel.clone());
    let invocation = Invocation::new("openurl", vec![url.clone()], req.flags.clone());
    let result = backend.run(&session.device, &invocation, &exec_ctx).await?;
    Ok(json!({"event": event, "url": url, "result": result}))
}

/// Recording output default location for a session.
pub fn recording_path(state: &DaemonState, session: &str) -> PathBuf {
    state
        .sessions
        .session_dir(session)
        .join(format!("recording-{}.mp4", state.sessions.now_ms()))
}
