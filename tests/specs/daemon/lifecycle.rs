//! Daemon lifecycle specs: startup, metadata, graceful shutdown.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn startup_publishes_metadata() {
    let daemon = Daemon::launch("dual");
    let meta = daemon.metadata().unwrap();

    assert_eq!(meta["transport"], "dual");
    assert!(meta["port"].as_u64().is_some());
    assert!(meta["httpPort"].as_u64().is_some());
    assert_eq!(meta["token"].as_str().unwrap().len(), 32);
    assert!(meta["pid"].as_u64().is_some());
    assert!(meta["version"].as_str().is_some());
    assert!(meta["codeSignature"].as_str().unwrap().contains(':'));
    assert_eq!(
        meta["stateDir"].as_str().unwrap(),
        daemon.state_dir.path().to_string_lossy()
    );
}

#[test]
fn metadata_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let daemon = Daemon::launch("http");
    let mode = std::fs::metadata(daemon.state_dir.path().join("daemon.json"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn sigterm_shuts_down_cleanly() {
    let mut daemon = Daemon::launch("http");
    let pid = daemon.pid();
    assert!(process_exists(pid));

    daemon.stop();

    // Metadata and lock are gone; exit was clean
    assert!(!daemon.state_dir.path().join("daemon.json").exists());
    assert!(!daemon.state_dir.path().join("daemon.lock").exists());
}

#[test]
fn socket_mode_omits_http_port() {
    let daemon = Daemon::launch("socket");
    let meta = daemon.metadata().unwrap();
    assert!(meta["port"].as_u64().is_some());
    assert!(meta.get("httpPort").is_none() || meta["httpPort"].is_null());
}

#[test]
fn socket_transport_round_trips_line_json() {
    use std::io::{BufRead, BufReader, Write};

    let daemon = Daemon::launch("socket");
    let port = daemon.socket_port();
    let token = daemon.token();

    let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
    let request = serde_json::json!({
        "token": token,
        "session": "default",
        "command": "session_list",
    });
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    stream.write_all(line.as_bytes()).unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    let value: serde_json::Value = serde_json::from_str(response.trim()).unwrap();
    assert_eq!(value["ok"], serde_json::json!(true));
    assert!(value["data"]["sessions"].as_array().unwrap().is_empty());
}

#[test]
fn bad_token_is_rejected_over_the_socket() {
    use std::io::{BufRead, BufReader, Write};

    let daemon = Daemon::launch("socket");
    let mut stream = std::net::TcpStream::connect(("127.0.0.1", daemon.socket_port())).unwrap();
    stream
        .write_all(b"{\"token\": \"wrong\", \"command\": \"session_list\"}\n")
        .unwrap();

    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    let value: serde_json::Value = serde_json::from_str(response.trim()).unwrap();
    assert_eq!(value["ok"], serde_json::json!(false));
    assert_eq!(value["error"]["code"], "UNAUTHORIZED");
}

#[test]
fn daemon_log_starts_with_marker() {
    let daemon = Daemon::launch("http");
    assert!(
        wait_until(Duration::from_secs(2), || daemon
            .log_contents()
            .contains("--- add: starting (pid: ")),
        "log: {}",
        daemon.log_contents()
    );
}

#[test]
fn version_flag_prints_without_touching_state() {
    let output = std::process::Command::new(binary_path("add"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("add "));
}
