// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot operations: `snapshot` and `diff`.

use serde_json::{json, Value};

use ad_core::{DaemonError, Request};

use super::{dispatch_for_session, HandlerCtx};

pub async fn handle(ctx: &HandlerCtx<'_>, req: &Request) -> Option<Result<Value, DaemonError>> {
    match req.command.as_str() {
        "snapshot" => Some(snapshot(ctx, req).await),
        "diff" => Some(diff(ctx, req).await),
        _ => None,
    }
}

async fn snapshot(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let data = dispatch_for_session(ctx, req).await?;
    cache_snapshot(ctx, &req.session, &data)?;
    Ok(data)
}

/// Compare a fresh snapshot against the session's cached one.
async fn diff(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let previous = ctx
        .state
        .sessions
        .get(&req.session)
        .ok_or_else(|| DaemonError::session_not_found(&req.session))?
        .last_snapshot;

    let mut snapshot_req = req.clone();
    snapshot_req.command = "snapshot".to_string();
    let data = dispatch_for_session(ctx, &snapshot_req).await?;
    let fresh = snapshot_text(&data);
    cache_snapshot(ctx, &req.session, &data)?;

    let Some(previous) = previous else {
        return Ok(json!({
            "baseline": false,
            "added": fresh.lines().count(),
            "removed": 0,
            "changes": [],
        }));
    };

    let (added, removed, changes) = diff_lines(&previous, &fresh);
    Ok(json!({
        "baseline": true,
        "added": added,
        "removed": removed,
        "changes": changes,
    }))
}

fn cache_snapshot(
    ctx: &HandlerCtx<'_>,
    session: &str,
    data: &Value,
) -> Result<(), DaemonError> {
    let text = snapshot_text(data);
    ctx.state
        .sessions
        .update(session, |s| s.last_snapshot = Some(text))
}

fn snapshot_text(data: &Value) -> String {
    data.get("snapshot")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| data.to_string())
}

/// Line-wise set difference, order-insensitive within each side.
fn diff_lines(old: &str, new: &str) -> (usize, usize, Vec<Value>) {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut changes = Vec::new();
    let mut added = 0;
    let mut removed = 0;

    for line in &new_lines {
        if !old_lines.contains(line) {
            added += 1;
            changes.push(json!({"op": "add", "line": line}));
        }
    }
    for line in &old_lines {
        if !new_lines.contains(line) {
            removed += 1;
            changes.push(json!({"op": "remove", "line": line}));
        }
    }
    (added, removed, changes)
}
