// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client: bootstrap, takeover, and request submission.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use ad_backends::orphans;
use ad_core::{Request, Response};
use ad_daemon::metadata::{self, DaemonMetadata};

use crate::daemon_process::{
    cleanup_stale_files, metadata_is_live, metadata_matches_installed, probe_port,
    read_startup_error, start_daemon_background, state_dir, stop_daemon_sync,
};

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("daemon rejected request: {0}")]
    Rejected(String),

    #[error("unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine state directory")]
    NoStateDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Socket,
    Http,
}

/// A connected (well, addressable) daemon.
pub struct DaemonClient {
    pub meta: DaemonMetadata,
    pub transport: Transport,
    state_dir: PathBuf,
}

impl DaemonClient {
    /// Locate a live, matching daemon or take over and launch a fresh
    /// one, then choose a transport.
    pub async fn ensure() -> Result<Self, ClientError> {
        let state_dir = state_dir()?;

        if let Some(meta) = metadata::read_metadata(&state_dir) {
            let reachable = reachable(&meta);
            if reachable && metadata_is_live(&meta) && metadata_matches_installed(&meta) {
                let transport = choose_transport(&meta)?;
                return Ok(Self {
                    meta,
                    transport,
                    state_dir,
                });
            }
            // Stale, unreachable, or outdated daemon: replace it
            stop_daemon_sync(&state_dir);
        }

        Self::launch(state_dir).await
    }

    /// Connect only; never start or replace a daemon.
    pub async fn connect() -> Result<Self, ClientError> {
        let state_dir = state_dir()?;
        let meta = metadata::read_metadata(&state_dir).ok_or(ClientError::DaemonNotRunning)?;
        if !reachable(&meta) {
            return Err(ClientError::DaemonNotRunning);
        }
        let transport = choose_transport(&meta)?;
        Ok(Self {
            meta,
            transport,
            state_dir,
        })
    }

    async fn launch(state_dir: PathBuf) -> Result<Self, ClientError> {
        cleanup_stale_files(&state_dir);
        let mut child = start_daemon_background(&state_dir)?;

        let deadline = Instant::now() + crate::env::startup_timeout();
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                let detail = read_startup_error(&state_dir)
                    .unwrap_or_else(|| format!("exited with {status}"));
                return Err(ClientError::DaemonStartFailed(detail));
            }
            if let Some(meta) = metadata::read_metadata(&state_dir) {
                if reachable(&meta) {
                    let transport = choose_transport(&meta)?;
                    return Ok(Self {
                        meta,
                        transport,
                        state_dir,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Err(read_startup_error(&state_dir)
                    .map(ClientError::DaemonStartFailed)
                    .unwrap_or(ClientError::DaemonStartTimeout));
            }
            tokio::time::sleep(crate::env::startup_poll()).await;
        }
    }

    /// Send one request with the client-side timeout.
    ///
    /// On timeout, orphaned runner builds are swept; with
    /// AGENT_DEVICE_RESET_ON_TIMEOUT set the daemon itself is killed and
    /// its files removed so the next invocation starts fresh.
    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let timeout = crate::env::request_timeout();
        let attempt = match self.transport {
            Transport::Socket => tokio::time::timeout(timeout, self.send_socket(request)).await,
            Transport::Http => tokio::time::timeout(timeout, self.send_http(request)).await,
        };
        match attempt {
            Ok(result) => result,
            Err(_) => {
                orphans::sweep_runner_orphans().await;
                if crate::env::reset_on_timeout() {
                    ad_backends::process::signal(self.meta.pid, "-9");
                    cleanup_stale_files(&self.state_dir);
                }
                Err(ClientError::RequestTimeout(timeout))
            }
        }
    }

    /// Fill in the token and send.
    pub async fn submit(&self, mut request: Request) -> Result<Response, ClientError> {
        request.token = Some(self.meta.token.clone());
        self.send(&request).await
    }

    async fn send_socket(&self, request: &Request) -> Result<Response, ClientError> {
        let port = self.meta.port.ok_or(ClientError::DaemonNotRunning)?;
        let stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let (read, mut write) = stream.into_split();

        let mut line = serde_json::to_string(request)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        write.write_all(line.as_bytes()).await?;

        let mut reader = BufReader::new(read);
        let mut response = String::new();
        reader.read_line(&mut response).await?;
        serde_json::from_str(response.trim()).map_err(|_| ClientError::UnexpectedResponse)
    }

    /// Minimal JSON-RPC POST over a raw stream; keeps the client free
    /// of an HTTP dependency.
    async fn send_http(&self, request: &Request) -> Result<Response, ClientError> {
        let port = self.meta.http_port.ok_or(ClientError::DaemonNotRunning)?;
        let envelope = serde_json::json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().simple().to_string(),
            "method": "agent_device.command",
            "params": request,
        });
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
        let head = format!(
            "POST /rpc HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&body).await?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        let raw = String::from_utf8_lossy(&raw);
        let body = raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .ok_or(ClientError::UnexpectedResponse)?;
        let value: serde_json::Value =
            serde_json::from_str(body.trim()).map_err(|_| ClientError::UnexpectedResponse)?;

        if let Some(result) = value.get("result") {
            return serde_json::from_value(result.clone())
                .map_err(|_| ClientError::UnexpectedResponse);
        }
        if let Some(error) = value.get("error") {
            if let Some(data) = error.get("data") {
                if let Ok(daemon_error) = serde_json::from_value(data.clone()) {
                    return Ok(Response::failure(daemon_error));
                }
            }
            let message = error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("rpc error");
            return Err(ClientError::Rejected(message.to_string()));
        }
        Err(ClientError::UnexpectedResponse)
    }
}

fn reachable(meta: &DaemonMetadata) -> bool {
    meta.port.map(probe_port).unwrap_or(false) || meta.http_port.map(probe_port).unwrap_or(false)
}

/// Transport per preference: auto prefers the socket, falling back to
/// HTTP when the daemon only serves HTTP.
fn choose_transport(meta: &DaemonMetadata) -> Result<Transport, ClientError> {
    match crate::env::transport_preference().as_str() {
        "socket" => meta
            .port
            .map(|_| Transport::Socket)
            .ok_or(ClientError::DaemonNotRunning),
        "http" => meta
            .http_port
            .map(|_| Transport::Http)
            .ok_or(ClientError::DaemonNotRunning),
        _ => {
            if meta.port.is_some() {
                Ok(Transport::Socket)
            } else if meta.http_port.is_some() {
                Ok(Transport::Http)
            } else {
                Err(ClientError::DaemonNotRunning)
            }
        }
    }
}
