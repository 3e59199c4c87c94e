// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request pipeline.
//!
//! Every transport funnels into [`handle_request`], which runs the
//! ordered stages: token check, alias normalization, tenant scoping,
//! lease admission, selector compatibility, handler demultiplexing,
//! default dispatch, journaling, and finalization.

pub mod batch;
pub mod find_ops;
pub mod interaction_ops;
pub mod lease_ops;
pub mod record_ops;
pub mod replay;
pub mod session_ops;
pub mod snapshot_ops;

use std::sync::Arc;

use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use ad_core::{
    valid_scope_id, CancelFlag, DaemonError, Request, Response, Selector, SessionIsolation,
};

use crate::diagnostics::DiagScope;
use crate::DaemonState;

/// Command aliases, applied once and never recursively.
const ALIASES: &[(&str, &str)] = &[
    ("click", "press"),
    ("tap", "press"),
    ("ls", "apps"),
    ("session-list", "session_list"),
];

/// Context threaded through handler groups for one request.
pub struct HandlerCtx<'a> {
    pub state: &'a Arc<DaemonState>,
    pub request_id: String,
    pub cancel: CancelFlag,
    /// Session name as the client sent it, before tenant rewriting.
    /// Batch and replay re-enter the pipeline with this name so the
    /// scoping stage reproduces the same effective session.
    pub original_session: String,
}

/// Handle one request end to end.
pub async fn handle_request(state: &Arc<DaemonState>, req: Request) -> Response {
    // Stage 1: token check, constant-time.
    if !token_ok(state, req.token.as_deref()) {
        return Response::failure(DaemonError::unauthorized("invalid token").normalize());
    }

    let mut req = req;

    // Stage 2: alias normalization.
    if let Some((_, canonical)) = ALIASES.iter().find(|(alias, _)| *alias == req.command) {
        req.command = canonical.to_string();
    }

    let request_id = req
        .meta
        .request_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    req.meta.request_id = Some(request_id.clone());

    let debug_on = req.meta.debug || req.flags.get_bool("debug");
    let mut scope = DiagScope::new(
        &req.session,
        &req.command,
        &request_id,
        debug_on,
        state.clock.as_ref(),
    );

    let cancel = state.cancels.register(&request_id);
    let ctx = HandlerCtx {
        state,
        request_id: request_id.clone(),
        cancel,
        original_session: req.session.clone(),
    };

    let result = process(&ctx, &mut req, &mut scope).await;
    state.cancels.finish(&request_id);
    finalize(state, &mut scope, result)
}

async fn process(
    ctx: &HandlerCtx<'_>,
    req: &mut Request,
    scope: &mut DiagScope,
) -> Result<Value, DaemonError> {
    let state = ctx.state;

    // Stage 3: tenant scoping.
    let isolation = effective_isolation(req);
    if isolation == SessionIsolation::Tenant {
        let tenant = req
            .meta
            .tenant_id
            .clone()
            .or_else(|| req.flags.get_str("tenant").map(String::from))
            .ok_or_else(|| {
                DaemonError::invalid_args("tenant isolation requires a tenantId")
                    .with_hint("Pass meta.tenantId or --tenant.")
            })?;
        if !valid_scope_id(&tenant) {
            return Err(DaemonError::invalid_args(format!(
                "invalid tenantId '{tenant}'"
            )));
        }
        req.meta.tenant_id = Some(tenant.clone());
        req.session = format!("{tenant}:{}", req.session);
        scope.event("debug", "tenant_scoped", json!({"session": req.session}));

        // Stage 4: lease admission.
        if !lease_exempt(&req.command) {
            let run_id = req
                .meta
                .run_id
                .clone()
                .or_else(|| req.flags.get_str("runId").map(String::from))
                .ok_or_else(|| {
                    DaemonError::invalid_args("tenant-isolated commands require a runId")
                })?;
            let lease_id = req
                .meta
                .lease_id
                .clone()
                .or_else(|| req.flags.get_str("leaseId").map(String::from))
                .ok_or_else(|| {
                    DaemonError::invalid_args("tenant-isolated commands require a leaseId")
                        .with_hint("Allocate one with lease_allocate first.")
                })?;
            state
                .leases
                .assert_admission(&tenant, &run_id, &lease_id, None)?;
            scope.event("debug", "lease_admitted", json!({"leaseId": lease_id}));
        }
    }

    // Stage 5: selector compatibility against an existing session.
    if !selector_exempt(&req.command) {
        if let Some(session) = state.sessions.get(&req.session) {
            let selector = Selector::from_flags(&req.flags)?;
            let conflicts = selector.conflicts_with(&session.device);
            if !conflicts.is_empty() {
                return Err(DaemonError::invalid_args(format!(
                    "selector conflicts with session '{}' on: {}",
                    req.session,
                    conflicts.join(", ")
                ))
                .with_details(json!({"conflicts": conflicts, "device": session.device})));
            }
        }
    }

    // Stage 6: handler groups, first claim wins.
    let handled = match lease_ops::handle(ctx, req).await {
        Some(result) => Some(result),
        None => match session_ops::handle(ctx, req, scope).await {
            Some(result) => Some(result),
            None => match snapshot_ops::handle(ctx, req).await {
                Some(result) => Some(result),
                None => match record_ops::handle(ctx, req).await {
                    Some(result) => Some(result),
                    None => match find_ops::handle(ctx, req).await {
                        Some(result) => Some(result),
                        None => interaction_ops::handle(ctx, req).await,
                    },
                },
            },
        },
    };

    // Stage 7: default dispatch for unclaimed commands.
    let data = match handled {
        Some(result) => result?,
        None => {
            debug!(command = %req.command, "default dispatch");
            dispatch_for_session(ctx, req).await?
        }
    };

    // Stage 8: journaling.
    if should_journal(&req.command) && state.sessions.get(&req.session).is_some() {
        state
            .sessions
            .record_action(&req.session, &req.command, &req.args, &req.flags, &data);
    }

    Ok(data)
}

/// Stage 9: finalization.
fn finalize(
    state: &Arc<DaemonState>,
    scope: &mut DiagScope,
    result: Result<Value, DaemonError>,
) -> Response {
    match result {
        Ok(data) => {
            let duration_ms = scope.elapsed_ms();
            scope.event("info", "request_success", json!({"durationMs": duration_ms}));
            if scope.debug {
                scope.flush(&state.config.logs_path);
            }
            Response::success(data)
        }
        Err(mut err) => {
            scope.event(
                "error",
                "request_failed",
                json!({"code": err.code.as_str(), "message": err.message.clone()}),
            );
            info!(command = %scope.command, code = err.code.as_str(), "request failed");
            let log_path = scope.flush(&state.config.logs_path);
            if err.diagnostic_id.is_none() {
                err.diagnostic_id = Some(scope.diag_id().to_string());
            }
            if err.log_path.is_none() {
                err.log_path = log_path;
            }
            Response::failure(err.normalize())
        }
    }
}

fn token_ok(state: &DaemonState, presented: Option<&str>) -> bool {
    let Some(presented) = presented else {
        return false;
    };
    let a = presented.as_bytes();
    let b = state.token.as_bytes();
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn effective_isolation(req: &Request) -> SessionIsolation {
    if let Some(isolation) = req.meta.session_isolation {
        return isolation;
    }
    match req.flags.get_str("sessionIsolation") {
        Some("tenant") => SessionIsolation::Tenant,
        _ => SessionIsolation::None,
    }
}

/// Lease admission exemptions: listing surfaces and the lease ops
/// themselves.
fn lease_exempt(command: &str) -> bool {
    matches!(command, "session_list" | "devices") || command.starts_with("lease_")
}

fn selector_exempt(command: &str) -> bool {
    matches!(command, "session_list" | "devices")
}

fn should_journal(command: &str) -> bool {
    !matches!(command, "session_list" | "devices" | "batch" | "replay" | "perf")
        && !command.starts_with("lease_")
}

/// Shared tail for handlers that just need the session's backend:
/// require the session, capability-check, dispatch. UI commands first
/// bring up the device's runner session.
pub(crate) async fn dispatch_for_session(
    ctx: &HandlerCtx<'_>,
    req: &Request,
) -> Result<Value, DaemonError> {
    let session = ctx
        .state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?;
    if crate::runners::needs_runner(&req.command)
        && ad_core::command_supported(&req.command, session.device.platform, session.device.kind)
    {
        crate::runners::ensure_runner(ctx.state, &session.device).await?;
    }
    ctx.state
        .dispatcher
        .execute(&session, req, &ctx.request_id, ctx.cancel.clone())
        .await
}

#[cfg(test)]
#[path = "../pipeline_tests/mod.rs"]
mod tests;
