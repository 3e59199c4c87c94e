// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket transport: newline-delimited JSON over loopback TCP.
//!
//! One JSON request per line, one JSON response per line; requests on a
//! connection are handled serially, responses in request order. When a
//! connection drops mid-request, its in-flight ids are marked canceled
//! and active runner sessions are repeatedly signaled to abort.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};

use ad_core::{DaemonError, Request, Response};

use crate::pipeline::handle_request;
use crate::runners::drain_in_flight;
use crate::DaemonState;

/// Reject lines larger than this before parsing.
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

pub struct SocketServer {
    listener: TcpListener,
    state: Arc<DaemonState>,
}

impl SocketServer {
    pub fn new(listener: TcpListener, state: Arc<DaemonState>) -> Self {
        Self { listener, state }
    }

    /// Accept loop; one task per connection.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "connection accepted");
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        handle_connection(stream, state).await;
                    });
                }
                Err(e) => {
                    error!("accept error: {e}");
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<DaemonState>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let mut issued_ids: Vec<String> = Vec::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(n) if n > MAX_LINE_BYTES => {
                let response = Response::failure(
                    DaemonError::invalid_args("request line too large").normalize(),
                );
                if write_response(&mut write_half, &response).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("connection read error: {e}");
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line.trim()) {
            Ok(request) => request,
            Err(e) => {
                let response = Response::failure(
                    DaemonError::invalid_args(format!("malformed request: {e}")).normalize(),
                );
                if write_response(&mut write_half, &response).await.is_err() {
                    break;
                }
                continue;
            }
        };

        // Pin the request id here so a disconnect can cancel it
        let request_id = request
            .meta
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let mut request = request;
        request.meta.request_id = Some(request_id.clone());
        issued_ids.push(request_id.clone());

        let handle_fut = handle_request(&state, request);
        tokio::pin!(handle_fut);

        // Serial handling, but watch the read side so a disconnect
        // mid-request turns into a cancellation.
        let mut watch_read = true;
        let response = loop {
            tokio::select! {
                response = &mut handle_fut => break response,
                peeked = reader.fill_buf(), if watch_read => {
                    match peeked {
                        Ok([]) | Err(_) => {
                            warn!(request_id = %request_id, "client disconnected mid-request");
                            state.cancels.cancel(&request_id);
                            // Keep signaling runner aborts until the
                            // canceled request actually drains
                            let state = Arc::clone(&state);
                            let ids = vec![request_id.clone()];
                            tokio::spawn(async move {
                                drain_in_flight(&state.runners, &state.cancels, &ids).await;
                            });
                            watch_read = false;
                        }
                        Ok(_) => {
                            // Pipelined data; stop polling until this
                            // request finishes
                            watch_read = false;
                        }
                    }
                }
            }
        };

        if write_response(&mut write_half, &response).await.is_err() {
            // Client is gone; response dropped
            break;
        }
    }

    disconnect_cleanup(&state, &issued_ids).await;
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &Response,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(response)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Mark everything this connection issued as canceled and drive the
/// runner-abort window until in-flight work drains.
async fn disconnect_cleanup(state: &Arc<DaemonState>, issued_ids: &[String]) {
    let mut any_active = false;
    for request_id in issued_ids {
        if state.cancels.is_active(request_id) {
            state.cancels.cancel(request_id);
            any_active = true;
        }
    }
    if any_active {
        drain_in_flight(&state.runners, &state.cancels, issued_ids).await;
    }
}

#[cfg(test)]
#[path = "socket_tests.rs"]
mod tests;
