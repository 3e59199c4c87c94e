// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease operations: allocate, heartbeat, release.

use serde_json::{json, Value};

use ad_core::{valid_lease_id, DaemonError, Request};

use super::HandlerCtx;

pub async fn handle(ctx: &HandlerCtx<'_>, req: &Request) -> Option<Result<Value, DaemonError>> {
    match req.command.as_str() {
        "lease_allocate" => Some(allocate(ctx, req)),
        "lease_heartbeat" => Some(heartbeat(ctx, req)),
        "lease_release" => Some(release(ctx, req)),
        _ => None,
    }
}

fn tenant_of(req: &Request) -> Option<String> {
    req.meta
        .tenant_id
        .clone()
        .or_else(|| req.flags.get_str("tenantId").map(String::from))
        .or_else(|| req.flags.get_str("tenant").map(String::from))
}

fn run_of(req: &Request) -> Option<String> {
    req.meta
        .run_id
        .clone()
        .or_else(|| req.flags.get_str("runId").map(String::from))
}

fn lease_of(req: &Request) -> Option<String> {
    req.meta
        .lease_id
        .clone()
        .or_else(|| req.flags.get_str("leaseId").map(String::from))
}

fn require_lease_id(req: &Request, op: &str) -> Result<String, DaemonError> {
    let lease_id =
        lease_of(req).ok_or_else(|| DaemonError::invalid_args(format!("{op} requires a leaseId")))?;
    if !valid_lease_id(&lease_id) {
        return Err(DaemonError::invalid_args("malformed leaseId")
            .with_hint("Lease ids are 16-128 hex characters."));
    }
    Ok(lease_id)
}

fn allocate(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let tenant = tenant_of(req)
        .ok_or_else(|| DaemonError::invalid_args("lease_allocate requires a tenantId"))?;
    let run = run_of(req)
        .ok_or_else(|| DaemonError::invalid_args("lease_allocate requires a runId"))?;
    let backend = req.flags.get_str("backend").map(String::from);
    let ttl_ms = req.flags.get_u64("ttlMs");

    let lease = ctx
        .state
        .leases
        .allocate(&tenant, &run, backend.as_deref(), ttl_ms)?;
    Ok(json!({"lease": lease}))
}

fn heartbeat(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let lease_id = require_lease_id(req, "lease_heartbeat")?;
    let lease = ctx.state.leases.heartbeat(
        &lease_id,
        tenant_of(req).as_deref(),
        run_of(req).as_deref(),
        req.flags.get_u64("ttlMs"),
    )?;
    Ok(json!({"lease": lease}))
}

fn release(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let lease_id = require_lease_id(req, "lease_release")?;
    let released = ctx.state.leases.release(
        &lease_id,
        tenant_of(req).as_deref(),
        run_of(req).as_deref(),
    )?;
    Ok(json!({"released": released}))
}
