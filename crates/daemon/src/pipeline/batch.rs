// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch execution: re-enter the pipeline per step, fail fast.

use std::time::Instant;

use serde_json::{json, Value};

use ad_core::{DaemonError, Flags, Request};

use super::{handle_request, HandlerCtx};

/// Selector flags a batch step inherits from its parent unless the step
/// overrides them.
pub(crate) const INHERITED_FLAGS: &[&str] = &[
    "platform",
    "target",
    "device",
    "udid",
    "serial",
    "simulatorSet",
    "serialAllowlist",
    "tenant",
    "sessionIsolation",
    "runId",
    "leaseId",
];

/// One parsed batch step.
pub(crate) struct Step {
    pub command: String,
    pub args: Vec<String>,
    pub flags: Flags,
    pub session: Option<String>,
}

pub async fn run(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let steps = parse_steps(req)?;
    let max_steps = req
        .flags
        .get_u64("maxSteps")
        .map(|n| n as usize)
        .unwrap_or_else(crate::env::batch_max_steps);
    if steps.len() > max_steps {
        return Err(DaemonError::invalid_args(format!(
            "batch of {} steps exceeds the limit of {max_steps}",
            steps.len()
        )));
    }
    // Nested re-entry would make cancellation and journaling ambiguous
    if let Some(step) = steps
        .iter()
        .find(|s| s.command == "batch" || s.command == "replay")
    {
        return Err(DaemonError::invalid_args(format!(
            "'{}' cannot be nested inside batch",
            step.command
        )));
    }

    let total = steps.len();
    let started = Instant::now();
    let mut results: Vec<Value> = Vec::with_capacity(total);

    for (index, step) in steps.into_iter().enumerate() {
        if ctx.cancel.is_canceled() {
            return Err(DaemonError::canceled().with_details(json!({
                "step": index + 1,
                "executed": results.len(),
                "partialResults": results,
            })));
        }

        let child = child_request(ctx, req, &step, index);
        let response = Box::pin(handle_request(ctx.state, child)).await;
        match response.error {
            None => results.push(response.data.unwrap_or(Value::Null)),
            Some(error) => {
                return Err(DaemonError::new(error.code, error.message)
                    .with_details(json!({
                        "step": index + 1,
                        "executed": results.len(),
                        "partialResults": results,
                    })));
            }
        }
    }

    Ok(json!({
        "total": total,
        "executed": results.len(),
        "totalDurationMs": started.elapsed().as_millis() as u64,
        "results": results,
    }))
}

fn parse_steps(req: &Request) -> Result<Vec<Step>, DaemonError> {
    let raw = req
        .flags
        .get("steps")
        .ok_or_else(|| DaemonError::invalid_args("batch requires --steps"))?;
    let items = raw
        .as_array()
        .ok_or_else(|| DaemonError::invalid_args("batch steps must be an array"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let object = item.as_object().ok_or_else(|| {
                DaemonError::invalid_args(format!("batch step {} must be an object", index + 1))
            })?;
            let command = object
                .get("command")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    DaemonError::invalid_args(format!(
                        "batch step {} is missing a command",
                        index + 1
                    ))
                })?
                .to_string();
            let args = object
                .get("args")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let flags = object
                .get("flags")
                .cloned()
                .map(|v| serde_json::from_value(v).unwrap_or_default())
                .unwrap_or_default();
            let session = object
                .get("session")
                .and_then(Value::as_str)
                .map(String::from);
            Ok(Step {
                command,
                args,
                flags,
                session,
            })
        })
        .collect()
}

/// Build the re-entrant request for one step.
pub(crate) fn child_request(
    ctx: &HandlerCtx<'_>,
    parent: &Request,
    step: &Step,
    index: usize,
) -> Request {
    let mut flags = Flags::new();
    for key in INHERITED_FLAGS {
        if let Some(value) = parent.flags.get(key) {
            flags.insert(*key, value.clone());
        }
    }
    let flags = flags.merged_with(&step.flags);

    let mut meta = parent.meta.clone();
    meta.request_id = Some(format!("{}.{}", ctx.request_id, index + 1));

    Request {
        token: Some(ctx.state.token.clone()),
        // The pre-scoping name: the pipeline re-applies tenant scoping
        session: step
            .session
            .clone()
            .unwrap_or_else(|| ctx.original_session.clone()),
        command: step.command.clone(),
        args: step.args.clone(),
        flags,
        meta,
    }
}
