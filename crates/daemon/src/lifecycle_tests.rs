// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::env::ServerMode;
use ad_backends::FakeBackend;

fn test_config() -> (Config, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    (Config::at(dir.path().to_path_buf()), dir)
}

#[test]
fn config_paths_live_under_state_dir() {
    let (config, dir) = test_config();
    assert_eq!(config.lock_path, dir.path().join("daemon.lock"));
    assert_eq!(config.metadata_path, dir.path().join("daemon.json"));
    assert_eq!(config.log_path, dir.path().join("daemon.log"));
    assert_eq!(config.sessions_path, dir.path().join("sessions"));
}

#[test]
fn acquire_lock_writes_lock_info() {
    let (config, _dir) = test_config();
    let _file = acquire_lock(&config).unwrap();

    let info = metadata::read_lock(&config.state_dir).unwrap();
    assert_eq!(info.pid, std::process::id());
    assert_eq!(info.version, crate::VERSION);
    assert!(info.start_time.is_some());
}

#[test]
fn stale_lock_is_replaced() {
    let (config, _dir) = test_config();
    std::fs::create_dir_all(&config.state_dir).unwrap();
    // A dead PID cannot be a live daemon; the lock is stale
    let stale = LockInfo {
        pid: 4_194_304,
        start_time: None,
        started_at_ms: 0,
        version: "0.0.1".into(),
    };
    std::fs::write(&config.lock_path, serde_json::to_string(&stale).unwrap()).unwrap();

    let _file = acquire_lock(&config).unwrap();
    let info = metadata::read_lock(&config.state_dir).unwrap();
    assert_eq!(info.pid, std::process::id());
}

#[test]
fn unparseable_lock_is_treated_as_stale() {
    let (config, _dir) = test_config();
    std::fs::create_dir_all(&config.state_dir).unwrap();
    std::fs::write(&config.lock_path, "garbage").unwrap();
    assert!(acquire_lock(&config).is_ok());
}

#[tokio::test]
async fn startup_binds_servers_and_writes_metadata() {
    let (config, _dir) = test_config();
    let result = startup(
        &config,
        vec![Arc::new(FakeBackend::new())],
        ServerMode::Dual,
    )
    .await
    .unwrap();

    assert!(result.socket.is_some());
    assert!(result.http.is_some());

    let meta = metadata::read_metadata(&config.state_dir).unwrap();
    assert_eq!(meta.pid, std::process::id());
    assert_eq!(meta.transport, "dual");
    assert_eq!(meta.token, result.state.token);
    assert!(meta.port.is_some());
    assert!(meta.http_port.is_some());
    assert_eq!(meta.token.len(), 32);
    assert!(meta.code_signature.split(':').count() >= 3);
}

#[tokio::test]
async fn socket_mode_skips_http() {
    let (config, _dir) = test_config();
    let result = startup(
        &config,
        vec![Arc::new(FakeBackend::new())],
        ServerMode::Socket,
    )
    .await
    .unwrap();
    assert!(result.socket.is_some());
    assert!(result.http.is_none());
    let meta = metadata::read_metadata(&config.state_dir).unwrap();
    assert!(meta.http_port.is_none());
}

#[tokio::test]
async fn shutdown_releases_metadata_and_lock() {
    let (config, _dir) = test_config();
    let result = startup(
        &config,
        vec![Arc::new(FakeBackend::new())],
        ServerMode::Socket,
    )
    .await
    .unwrap();

    assert!(config.metadata_path.exists());
    assert!(config.lock_path.exists());

    shutdown(&result.state).await;
    assert!(!config.metadata_path.exists());
    assert!(!config.lock_path.exists());
}

#[tokio::test]
async fn shutdown_stops_runner_sessions() {
    let (config, _dir) = test_config();
    let result = startup(
        &config,
        vec![Arc::new(FakeBackend::new())],
        ServerMode::Socket,
    )
    .await
    .unwrap();
    let state = &result.state;

    let open = ad_core::Request::new("open")
        .with_token(state.token.clone())
        .with_args(vec!["Settings".into()]);
    assert!(crate::pipeline::handle_request(state, open).await.ok);
    let press = ad_core::Request::new("press")
        .with_token(state.token.clone())
        .with_args(vec!["Login".into()]);
    assert!(crate::pipeline::handle_request(state, press).await.ok);
    assert_eq!(state.runners.active_count(), 1);

    shutdown(state).await;
    assert_eq!(state.runners.active_count(), 0);
}

#[tokio::test]
async fn shutdown_drains_open_sessions() {
    let (config, _dir) = test_config();
    let result = startup(
        &config,
        vec![Arc::new(FakeBackend::new())],
        ServerMode::Socket,
    )
    .await
    .unwrap();
    let state = &result.state;

    let device = state
        .dispatcher
        .select_device(&ad_core::Selector::default())
        .await
        .unwrap();
    state
        .sessions
        .insert(ad_core::Session::new("default", device, 0))
        .unwrap();

    shutdown(state).await;
    assert!(state.sessions.list().is_empty());
    // The journal was persisted on the way down
    let entries: Vec<_> = std::fs::read_dir(&config.sessions_path)
        .unwrap()
        .flatten()
        .filter(|e| e.path().extension().is_some_and(|x| x == "ad"))
        .collect();
    assert_eq!(entries.len(), 1);
}
