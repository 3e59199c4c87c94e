// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay: evaluate an `.ad` script line by line through the pipeline.
//!
//! `--update` mode repairs a failing step: capture a fresh snapshot,
//! resolve a better target for the action, rewrite the script
//! atomically, and retry the step once.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::info;

use ad_core::{encode_action, parse_line, ActionRecord, DaemonError, Request};

use super::{batch, dispatch_for_session, handle_request, HandlerCtx};

pub async fn run(ctx: &HandlerCtx<'_>, req: &Request) -> Result<Value, DaemonError> {
    let script_arg = req
        .args
        .first()
        .ok_or_else(|| DaemonError::invalid_args("replay requires a script path"))?;
    let script_path = resolve_path(req, script_arg);
    let content = std::fs::read_to_string(&script_path).map_err(|e| {
        DaemonError::invalid_args(format!("cannot read script {}: {e}", script_path.display()))
    })?;
    let update_mode = req.flags.get_bool("update");

    // Raw lines are kept verbatim so comments and spacing survive rewrite
    let mut raw_lines: Vec<String> = content.lines().map(String::from).collect();
    let mut updated = 0usize;
    let mut executed = 0usize;
    let mut total = 0usize;

    for index in 0..raw_lines.len() {
        if ctx.cancel.is_canceled() {
            return Err(DaemonError::canceled()
                .with_details(json!({"line": index + 1, "executed": executed})));
        }

        let parsed = parse_line(&raw_lines[index]).map_err(|e| {
            DaemonError::invalid_args(format!("script line {}: {e}", index + 1))
        })?;
        let Some(mut line) = parsed else {
            continue;
        };
        total += 1;

        if line.command == "batch" || line.command == "replay" {
            return Err(DaemonError::invalid_args(format!(
                "'{}' cannot be replayed from a script (line {})",
                line.command,
                index + 1
            )));
        }

        let response = exec_line(ctx, req, &line, index).await;
        if response.ok {
            executed += 1;
            continue;
        }

        if update_mode {
            if let Some(new_target) = repair_target(ctx, req, &line.args).await {
                info!(line = index + 1, target = %new_target, "replay update rewrote target");
                if let Some(first) = line.args.first_mut() {
                    *first = new_target;
                }
                let retry = exec_line(ctx, req, &line, index).await;
                if retry.ok {
                    raw_lines[index] = encode_action(&ActionRecord {
                        command: line.command.clone(),
                        args: line.args.clone(),
                        flags: line.flags.clone(),
                        ok: true,
                        at_ms: 0,
                    });
                    updated += 1;
                    executed += 1;
                    continue;
                }
            }
        }

        let error = response
            .error
            .unwrap_or_else(|| DaemonError::command_failed("replay step failed"));
        return Err(DaemonError::new(error.code, error.message).with_details(json!({
            "line": index + 1,
            "command": line.command,
            "executed": executed,
        })));
    }

    if updated > 0 {
        rewrite_script(&script_path, &raw_lines)?;
    }

    Ok(json!({
        "script": script_path,
        "total": total,
        "executed": executed,
        "updated": updated,
    }))
}

async fn exec_line(
    ctx: &HandlerCtx<'_>,
    parent: &Request,
    line: &ad_core::ParsedLine,
    index: usize,
) -> ad_core::Response {
    let step = batch::Step {
        command: line.command.clone(),
        args: line.args.clone(),
        flags: line.flags.clone(),
        session: None,
    };
    let child = batch::child_request(ctx, parent, &step, index);
    Box::pin(handle_request(ctx.state, child)).await
}

/// Ask the device for a fresh snapshot and look for a better target.
async fn repair_target(
    ctx: &HandlerCtx<'_>,
    parent: &Request,
    args: &[String],
) -> Option<String> {
    let original = args.first()?;
    let mut snapshot_req = parent.clone();
    snapshot_req.command = "snapshot".to_string();
    snapshot_req.args = Vec::new();
    let data = dispatch_for_session(ctx, &snapshot_req).await.ok()?;
    let text = data.get("snapshot").and_then(Value::as_str)?;
    resolve_updated_target(text, original)
}

/// Pick a replacement target from snapshot text.
///
/// Prefers an exact accessibility label/text value that contains the
/// original query; falls back to the trimmed matching line.
pub(crate) fn resolve_updated_target(snapshot: &str, original: &str) -> Option<String> {
    let needle = original.to_ascii_lowercase();
    for line in snapshot.lines() {
        if !line.to_ascii_lowercase().contains(&needle) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(line.trim()) {
            for key in ["AXLabel", "AXIdentifier", "text", "resourceId", "contentDesc"] {
                if let Some(candidate) = value.get(key).and_then(Value::as_str) {
                    if candidate.to_ascii_lowercase().contains(&needle) {
                        return Some(candidate.to_string());
                    }
                }
            }
        }
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case(original) {
            continue;
        }
        return Some(trimmed.chars().take(80).collect());
    }
    None
}

/// Atomic rewrite: write to a temp file next to the script, then rename.
fn rewrite_script(path: &Path, lines: &[String]) -> Result<(), DaemonError> {
    let tmp = path.with_extension("ad.tmp");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&tmp, content)
        .and_then(|()| std::fs::rename(&tmp, path))
        .map_err(|e| DaemonError::command_failed(format!("cannot rewrite script: {e}")))
}

fn resolve_path(req: &Request, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        return path;
    }
    match &req.meta.cwd {
        Some(cwd) => cwd.join(path),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updated_target_prefers_label_values() {
        let snapshot = "{\"AXLabel\": \"Sign In Now\", \"frame\": {}}\nplain sign in line";
        assert_eq!(
            resolve_updated_target(snapshot, "sign in"),
            Some("Sign In Now".to_string())
        );
    }

    #[test]
    fn updated_target_falls_back_to_line_text() {
        let snapshot = "  Button: Checkout Basket  ";
        assert_eq!(
            resolve_updated_target(snapshot, "checkout"),
            Some("Button: Checkout Basket".to_string())
        );
    }

    #[test]
    fn no_match_yields_none() {
        assert_eq!(resolve_updated_target("nothing here", "login"), None);
    }

    #[test]
    fn relative_script_path_resolves_against_cwd() {
        let mut req = Request::new("replay");
        req.meta.cwd = Some(PathBuf::from("/work/project"));
        assert_eq!(
            resolve_path(&req, "scripts/flow.ad"),
            PathBuf::from("/work/project/scripts/flow.ad")
        );
        assert_eq!(resolve_path(&req, "/abs/flow.ad"), PathBuf::from("/abs/flow.ad"));
    }

    #[test]
    fn rewrite_is_atomic_to_the_target_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("flow.ad");
        std::fs::write(&script, "old\n").unwrap();
        rewrite_script(&script, &["new line".to_string()]).unwrap();
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "new line\n");
        assert!(!script.with_extension("ad.tmp").exists());
    }
}
