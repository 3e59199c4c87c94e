//! Test helpers for behavioral specifications.
//!
//! Provides a small harness: launch `add` against a temp state dir,
//! wait for metadata, speak HTTP/1.1 to it with a raw socket.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub const STARTUP_WAIT: Duration = Duration::from_secs(10);
pub const POLL: Duration = Duration::from_millis(50);

/// Returns the path to a built workspace binary.
///
/// The test binary lives at target/debug/deps/specs-<hash>, so its
/// grandparent is target/debug/ where add is built.
pub fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }
    standard
}

/// One daemon under test, killed on drop.
pub struct Daemon {
    pub child: Child,
    pub state_dir: tempfile::TempDir,
}

impl Daemon {
    /// Launch with the given server mode and wait for reachable metadata.
    pub fn launch(mode: &str) -> Self {
        let daemon = Self::spawn(mode);
        assert!(
            daemon.wait_for_metadata(),
            "daemon did not publish metadata within {STARTUP_WAIT:?}; log:\n{}",
            daemon.log_contents()
        );
        daemon
    }

    /// Spawn without waiting (for takeover/singleton races).
    pub fn spawn(mode: &str) -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let child = Self::spawn_into(mode, state_dir.path());
        Self { child, state_dir }
    }

    /// Launch with extra environment variables set on the daemon.
    pub fn launch_with_env(mode: &str, envs: &[(&str, &str)]) -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let mut cmd = Command::new(binary_path("add"));
        cmd.env("AGENT_DEVICE_STATE_DIR", state_dir.path())
            .env("AGENT_DEVICE_DAEMON_SERVER_MODE", mode)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let daemon = Self {
            child: cmd.spawn().unwrap(),
            state_dir,
        };
        assert!(
            daemon.wait_for_metadata(),
            "daemon did not publish metadata; log:\n{}",
            daemon.log_contents()
        );
        daemon
    }

    /// Spawn another daemon against an existing state directory.
    pub fn spawn_into(mode: &str, state_dir: &Path) -> Child {
        Command::new(binary_path("add"))
            .env("AGENT_DEVICE_STATE_DIR", state_dir)
            .env("AGENT_DEVICE_DAEMON_SERVER_MODE", mode)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    pub fn metadata(&self) -> Option<serde_json::Value> {
        read_metadata(self.state_dir.path())
    }

    pub fn wait_for_metadata(&self) -> bool {
        let deadline = Instant::now() + STARTUP_WAIT;
        while Instant::now() < deadline {
            if let Some(meta) = self.metadata() {
                let port = meta["httpPort"].as_u64().or(meta["port"].as_u64());
                if let Some(port) = port {
                    if TcpStream::connect(("127.0.0.1", port as u16)).is_ok() {
                        return true;
                    }
                }
            }
            std::thread::sleep(POLL);
        }
        false
    }

    pub fn token(&self) -> String {
        self.metadata().unwrap()["token"].as_str().unwrap().to_string()
    }

    pub fn http_port(&self) -> u16 {
        self.metadata().unwrap()["httpPort"].as_u64().unwrap() as u16
    }

    pub fn socket_port(&self) -> u16 {
        self.metadata().unwrap()["port"].as_u64().unwrap() as u16
    }

    pub fn pid(&self) -> u32 {
        self.metadata().unwrap()["pid"].as_u64().unwrap() as u32
    }

    pub fn log_contents(&self) -> String {
        std::fs::read_to_string(self.state_dir.path().join("daemon.log")).unwrap_or_default()
    }

    /// SIGTERM and wait for exit.
    pub fn stop(&mut self) {
        signal(self.child.id(), "-15");
        let deadline = Instant::now() + STARTUP_WAIT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(POLL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn read_metadata(state_dir: &Path) -> Option<serde_json::Value> {
    let raw = std::fs::read_to_string(state_dir.join("daemon.json")).ok()?;
    serde_json::from_str(&raw).ok()
}

pub fn signal(pid: u32, sig: &str) -> bool {
    Command::new("kill")
        .args([sig, &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn process_exists(pid: u32) -> bool {
    signal(pid, "-0")
}

pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(POLL);
    }
    false
}

/// One HTTP/1.1 exchange over a raw socket; `Connection: close` keeps
/// the read side simple.
pub fn http_exchange(port: u16, request: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

pub fn http_get(port: u16, path: &str) -> (u16, String) {
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nConnection: close\r\n\r\n"
    );
    http_exchange(port, &request)
}

pub fn http_post_rpc(port: u16, body: &serde_json::Value) -> (u16, serde_json::Value) {
    let payload = serde_json::to_string(body).unwrap();
    let request = format!(
        "POST /rpc HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let (status, body) = http_exchange(port, &request);
    let body = parse_http_body(&body);
    let value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    (status, value)
}

/// Strip HTTP/1.1 chunked transfer framing when present.
fn parse_http_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.to_string();
    }
    // chunked: size line, chunk, ..., terminated by a zero chunk
    let mut out = String::new();
    let mut rest = trimmed;
    loop {
        let Some((size_line, tail)) = rest.split_once("\r\n") else {
            break;
        };
        let Ok(size) = usize::from_str_radix(size_line.trim(), 16) else {
            break;
        };
        if size == 0 {
            break;
        }
        if tail.len() < size {
            break;
        }
        out.push_str(&tail[..size]);
        rest = tail[size..].trim_start_matches("\r\n");
    }
    if out.is_empty() {
        trimmed.to_string()
    } else {
        out
    }
}

/// JSON-RPC call against a running daemon.
pub fn rpc(
    daemon: &Daemon,
    method: &str,
    params: serde_json::Value,
) -> (u16, serde_json::Value) {
    http_post_rpc(
        daemon.http_port(),
        &serde_json::json!({
            "jsonrpc": "2.0",
            "id": "spec",
            "method": method,
            "params": params,
        }),
    )
}
