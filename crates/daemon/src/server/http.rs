// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: JSON-RPC 2.0 at `POST /rpc`, liveness at `GET /health`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{error, warn};

use ad_core::{valid_scope_id, DaemonError, ErrorCode, Flags, Request};

use crate::pipeline::handle_request;
use crate::server::authhook::{self, AuthOutcome};
use crate::DaemonState;

/// Request body cap: anything larger is a parse error by fiat.
pub const BODY_LIMIT: usize = 1024 * 1024;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const DAEMON_ERROR: i64 = -32000;
const AUTH_REJECTED: i64 = -32001;

pub fn router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rpc", post(rpc))
        // The 1 MiB contract is enforced in the handler so the reply is
        // a JSON-RPC parse error; the layer is just a hard backstop.
        .layer(DefaultBodyLimit::max(4 * BODY_LIMIT))
        .with_state(state)
}

/// Serve until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<DaemonState>) {
    if let Err(e) = axum::serve(listener, router(state)).await {
        error!("http server error: {e}");
    }
}

async fn health() -> Json<Value> {
    Json(json!({"ok": true}))
}

async fn rpc(
    State(state): State<Arc<DaemonState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if body.len() > BODY_LIMIT {
        return rpc_error(Value::Null, PARSE_ERROR, "Parse error", None, StatusCode::BAD_REQUEST);
    }
    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(_) => {
            return rpc_error(
                Value::Null,
                PARSE_ERROR,
                "Parse error",
                None,
                StatusCode::BAD_REQUEST,
            )
        }
    };

    let id = envelope.get("id").cloned().unwrap_or(Value::Null);
    let jsonrpc_ok = envelope.get("jsonrpc").and_then(Value::as_str) == Some("2.0");
    let Some(method) = envelope.get("method").and_then(Value::as_str) else {
        return rpc_error(
            id,
            INVALID_REQUEST,
            "Invalid Request",
            None,
            StatusCode::BAD_REQUEST,
        );
    };
    if !jsonrpc_ok {
        return rpc_error(
            id,
            INVALID_REQUEST,
            "Invalid Request",
            None,
            StatusCode::BAD_REQUEST,
        );
    }
    let params = envelope.get("params").cloned().unwrap_or(json!({}));

    let request = match build_request(method, &params, &headers) {
        Ok(Some(request)) => request,
        Ok(None) => {
            return rpc_error(
                id,
                METHOD_NOT_FOUND,
                "Method not found",
                None,
                StatusCode::NOT_FOUND,
            )
        }
        Err(message) => {
            return rpc_error(
                id,
                INVALID_PARAMS,
                &message,
                None,
                StatusCode::BAD_REQUEST,
            )
        }
    };

    // Optional auth hook runs before the request enters the pipeline
    let mut request = request;
    if let Some(hook) = &state.auth_hook {
        let context = json!({
            "headers": headers_value(&headers),
            "rpcRequest": envelope,
            "daemonRequest": request,
        });
        match authhook::consult(&hook.path, &hook.export, &context).await {
            Ok(AuthOutcome::Allow { tenant_id }) => {
                if let Some(tenant) = tenant_id {
                    if !valid_scope_id(&tenant) {
                        return rpc_error(
                            id,
                            DAEMON_ERROR,
                            "auth hook returned an invalid tenantId",
                            Some(json!({"code": ErrorCode::InvalidArgs.as_str()})),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        );
                    }
                    request.meta.tenant_id = Some(tenant);
                    if request.meta.session_isolation.is_none()
                        && request.flags.get_str("sessionIsolation").is_none()
                    {
                        request.meta.session_isolation =
                            Some(ad_core::SessionIsolation::Tenant);
                    }
                }
            }
            Ok(AuthOutcome::Reject(err)) => {
                warn!(code = err.code.as_str(), "auth hook rejected request");
                let status = http_status(err.code);
                let data = serde_json::to_value(&err.normalize()).unwrap_or(Value::Null);
                return rpc_error(id, AUTH_REJECTED, "auth rejected", Some(data), status);
            }
            Err(err) => {
                error!(error = %err, "auth hook invocation failed");
                return rpc_error(
                    id,
                    DAEMON_ERROR,
                    "auth hook failed",
                    None,
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
            }
        }
    }

    let response = handle_request(&state, request).await;
    if response.ok {
        let result = serde_json::to_value(&response).unwrap_or(Value::Null);
        (
            StatusCode::OK,
            Json(json!({"jsonrpc": "2.0", "id": id, "result": result})),
        )
    } else {
        let err = response.error.unwrap_or_else(|| {
            DaemonError::new(ErrorCode::Unknown, "missing error on failed response")
        });
        let status = http_status(err.code);
        let data = serde_json::to_value(&err).unwrap_or(Value::Null);
        rpc_error(id, DAEMON_ERROR, &err.message, Some(data), status)
    }
}

/// Map a JSON-RPC method to a daemon request; `None` is method-not-found.
fn build_request(
    method: &str,
    params: &Value,
    headers: &HeaderMap,
) -> Result<Option<Request>, String> {
    let canonical = method.replace('-', "_");
    match canonical.as_str() {
        "agent_device.command" => {
            let object = params
                .as_object()
                .ok_or_else(|| "params must be an object".to_string())?;
            let mut request: Request = serde_json::from_value(Value::Object(object.clone()))
                .map_err(|e| format!("invalid params: {e}"))?;
            if request.token.is_none() {
                request.token = header_token(headers);
            }
            Ok(Some(request))
        }
        "agent_device.lease.allocate" => Ok(Some(lease_request("lease_allocate", params, headers)?)),
        "agent_device.lease.heartbeat" => {
            Ok(Some(lease_request("lease_heartbeat", params, headers)?))
        }
        "agent_device.lease.release" => Ok(Some(lease_request("lease_release", params, headers)?)),
        _ => Ok(None),
    }
}

fn lease_request(
    command: &str,
    params: &Value,
    headers: &HeaderMap,
) -> Result<Request, String> {
    let object = params
        .as_object()
        .ok_or_else(|| "params must be an object".to_string())?;
    let mut flags = Flags::new();
    for key in ["tenantId", "runId", "leaseId", "ttlMs", "backend"] {
        if let Some(value) = object.get(key) {
            flags.insert(key, value.clone());
        }
    }
    let mut request = Request::new(command);
    request.flags = flags;
    request.token = object
        .get("token")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| header_token(headers));
    Ok(request)
}

/// Token resolution order: params, then the dedicated header, then
/// a bearer authorization.
fn header_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get("x-agent-device-token")
        .and_then(|v| v.to_str().ok())
    {
        return Some(token.to_string());
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(String::from)
}

fn headers_value(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            map.insert(name.as_str().to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(map)
}

fn http_status(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidArgs => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn rpc_error(
    id: Value,
    code: i64,
    message: &str,
    data: Option<Value>,
    status: StatusCode,
) -> (StatusCode, Json<Value>) {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    (
        status,
        Json(json!({"jsonrpc": "2.0", "id": id, "error": error})),
    )
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
