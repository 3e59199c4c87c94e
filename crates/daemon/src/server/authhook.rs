// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optional HTTP auth hook, invoked as a subprocess.
//!
//! Contract: the hook executable receives `{headers, rpcRequest,
//! daemonRequest}` as JSON on stdin and prints a decision as JSON on
//! stdout, exiting 0 for any well-formed decision. The decision shape:
//!
//! - `true` / empty output: allow.
//! - `false`: reject with UNAUTHORIZED.
//! - `{"ok": false, "code"?, "message"?, "details"?}`: reject.
//! - `{"ok": true, "tenantId"?}`: allow; a tenant id is injected into
//!   the daemon request, which also turns on tenant isolation when the
//!   request did not choose a mode itself.
//!
//! When the hook prints an object keyed by export names, the configured
//! export (default `default`) selects the decision.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use ad_backends::subprocess::{run_cmd, CmdOptions};
use ad_core::{DaemonError, ErrorCode};

const HOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of consulting the hook.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    Allow { tenant_id: Option<String> },
    Reject(DaemonError),
}

/// Run the hook and interpret its decision.
pub async fn consult(
    hook: &Path,
    export: &str,
    context: &Value,
) -> Result<AuthOutcome, DaemonError> {
    let input = serde_json::to_string(context)
        .map_err(|e| DaemonError::command_failed(format!("auth hook context: {e}")))?;
    let hook_str = hook.to_string_lossy().to_string();
    let output = run_cmd(
        &hook_str,
        &[],
        CmdOptions {
            stdin: Some(input),
            timeout: Some(HOOK_TIMEOUT),
            ..Default::default()
        },
    )
    .await
    .map_err(|e| DaemonError::command_failed(format!("auth hook failed: {}", e.message)))?;

    let decision = parse_decision(&output.stdout, export);
    Ok(interpret(decision))
}

fn parse_decision(stdout: &str, export: &str) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Value::Bool(false);
    };
    // A decision map keyed by export name
    if let Some(object) = value.as_object() {
        if object.contains_key(export) && !object.contains_key("ok") {
            return object.get(export).cloned().unwrap_or(Value::Null);
        }
    }
    value
}

/// Decision semantics: truthy/absent allows, false rejects, objects
/// carry structured verdicts.
pub fn interpret(decision: Value) -> AuthOutcome {
    match decision {
        Value::Null => AuthOutcome::Allow { tenant_id: None },
        Value::Bool(true) => AuthOutcome::Allow { tenant_id: None },
        Value::Bool(false) => {
            AuthOutcome::Reject(DaemonError::unauthorized("rejected by auth hook"))
        }
        Value::Object(map) => {
            let ok = map.get("ok").and_then(Value::as_bool);
            match ok {
                Some(true) | None => AuthOutcome::Allow {
                    tenant_id: map
                        .get("tenantId")
                        .and_then(Value::as_str)
                        .map(String::from),
                },
                Some(false) => {
                    let code = map
                        .get("code")
                        .and_then(Value::as_str)
                        .and_then(parse_code)
                        .unwrap_or(ErrorCode::Unauthorized);
                    let message = map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("rejected by auth hook")
                        .to_string();
                    let mut error = DaemonError::new(code, message);
                    if let Some(details) = map.get("details") {
                        error = error.with_details(details.clone());
                    }
                    AuthOutcome::Reject(error)
                }
            }
        }
        // Any other truthy-ish output allows
        _ => AuthOutcome::Allow { tenant_id: None },
    }
}

fn parse_code(raw: &str) -> Option<ErrorCode> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}
