// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use ad_backends::FakeBackend;
use crate::lifecycle::Config;

async fn start_server(backend: FakeBackend) -> (std::net::SocketAddr, Arc<DaemonState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::at(dir.path().to_path_buf());
    let state = Arc::new(DaemonState::new(
        config,
        vec![Arc::new(backend)],
        None,
    ));
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = SocketServer::new(listener, Arc::clone(&state));
    tokio::spawn(server.run());
    (addr, state, dir)
}

fn request_line(state: &DaemonState, command: &str) -> String {
    let request = Request::new(command).with_token(state.token.clone());
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    line
}

#[tokio::test]
async fn round_trips_a_request() {
    let (addr, state, _dir) = start_server(FakeBackend::new()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    write
        .write_all(request_line(&state, "session_list").as_bytes())
        .await
        .unwrap();

    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: Response = serde_json::from_str(line.trim()).unwrap();
    assert!(response.ok, "{:?}", response.error);
}

#[tokio::test]
async fn responses_preserve_request_order() {
    let (addr, state, _dir) = start_server(FakeBackend::new()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    // Pipeline two requests before reading anything
    let mut payload = request_line(&state, "session_list");
    payload.push_str(&request_line(&state, "devices"));
    write.write_all(payload.as_bytes()).await.unwrap();

    let mut first = String::new();
    reader.read_line(&mut first).await.unwrap();
    let first: Response = serde_json::from_str(first.trim()).unwrap();
    assert!(first.data.unwrap().get("sessions").is_some());

    let mut second = String::new();
    reader.read_line(&mut second).await.unwrap();
    let second: Response = serde_json::from_str(second.trim()).unwrap();
    assert!(second.data.unwrap().get("devices").is_some());
}

#[tokio::test]
async fn malformed_line_yields_invalid_args() {
    let (addr, _state, _dir) = start_server(FakeBackend::new()).await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    write.write_all(b"this is not json\n").await.unwrap();

    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let response: Response = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(
        response.error_code(),
        Some(ad_core::ErrorCode::InvalidArgs)
    );
}

#[tokio::test]
async fn disconnect_cancels_in_flight_request() {
    let backend = FakeBackend::new();
    let (addr, state, _dir) = start_server(backend.clone()).await;

    // A session so the slow command has something to dispatch against
    let open = Request::new("open")
        .with_token(state.token.clone())
        .with_args(vec!["Settings".into()]);
    assert!(crate::pipeline::handle_request(&state, open).await.ok);

    backend.set_delay(Duration::from_secs(30));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (_read, mut write) = stream.into_split();
    let mut request = Request::new("press")
        .with_token(state.token.clone())
        .with_args(vec!["Login".into()]);
    request.meta.request_id = Some("cancel-me".into());
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    write.write_all(line.as_bytes()).await.unwrap();

    // Give the server time to start handling, then drop the connection
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(state.cancels.is_active("cancel-me"));
    drop(write);
    drop(_read);

    // The request must finish as canceled well inside the abort window
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while state.cancels.is_active("cancel-me") {
        assert!(
            std::time::Instant::now() < deadline,
            "request was not canceled after disconnect"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn disconnect_signals_active_runners() {
    let backend = FakeBackend::new();
    let (addr, state, _dir) = start_server(backend.clone()).await;
    let open = Request::new("open")
        .with_token(state.token.clone())
        .with_args(vec!["Settings".into()]);
    assert!(crate::pipeline::handle_request(&state, open).await.ok);

    backend.set_delay(Duration::from_secs(30));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let request = Request::new("press")
        .with_token(state.token.clone())
        .with_args(vec!["Login".into()]);
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    write.write_all(line.as_bytes()).await.unwrap();

    // The press command brings up the device's runner session before
    // it dispatches
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.runners_started(), 1);
    let runner_abort = state.runners.abort_flag("FAKE-UDID-1").unwrap();
    assert!(!runner_abort.is_canceled());

    drop(write);
    drop(read);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !runner_abort.is_canceled() {
        assert!(
            std::time::Instant::now() < deadline,
            "runner was not signaled after disconnect"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
