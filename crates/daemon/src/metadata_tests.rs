// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample(state_dir: &Path) -> DaemonMetadata {
    DaemonMetadata {
        port: Some(45001),
        http_port: None,
        transport: "socket".into(),
        token: "aabbccddeeff00112233445566778899".into(),
        pid: 1234,
        process_start_time: Some("Mon Jul 27 10:00:00 2026".into()),
        version: "0.1.0".into(),
        code_signature: "add:1024:1700000000000".into(),
        state_dir: state_dir.to_path_buf(),
    }
}

#[test]
fn metadata_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let metadata = sample(dir.path());
    write_metadata(dir.path(), &metadata).unwrap();
    let read = read_metadata(dir.path()).unwrap();
    assert_eq!(read, metadata);
}

#[test]
fn metadata_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    write_metadata(dir.path(), &sample(dir.path())).unwrap();
    let mode = std::fs::metadata(metadata_path(dir.path()))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn metadata_uses_camel_case_keys() {
    let dir = tempfile::tempdir().unwrap();
    write_metadata(dir.path(), &sample(dir.path())).unwrap();
    let raw = std::fs::read_to_string(metadata_path(dir.path())).unwrap();
    assert!(raw.contains("\"codeSignature\""));
    assert!(raw.contains("\"processStartTime\""));
    assert!(raw.contains("\"stateDir\""));
    assert!(!raw.contains("httpPort"), "unset optional fields are omitted");
}

#[test]
fn missing_metadata_reads_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_metadata(dir.path()).is_none());
}

#[test]
fn corrupt_metadata_reads_none() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(metadata_path(dir.path()), "{not json").unwrap();
    assert!(read_metadata(dir.path()).is_none());
}

#[test]
fn remove_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    remove_metadata(dir.path());
    write_metadata(dir.path(), &sample(dir.path())).unwrap();
    remove_metadata(dir.path());
    assert!(read_metadata(dir.path()).is_none());
}

#[test]
fn lock_info_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let info = LockInfo {
        pid: 99,
        start_time: Some("Mon Jul 27 10:00:00 2026".into()),
        started_at_ms: 1_700_000_000_000,
        version: "0.1.0".into(),
    };
    std::fs::write(
        lock_path(dir.path()),
        serde_json::to_string(&info).unwrap(),
    )
    .unwrap();
    assert_eq!(read_lock(dir.path()).unwrap(), info);
}
