//! Singleton election specs.

use crate::prelude::*;
use std::time::Duration;

#[test]
fn second_daemon_yields_with_exit_zero() {
    let daemon = Daemon::launch("http");
    let meta_before = daemon.metadata().unwrap();

    let mut second = Daemon::spawn_into("http", daemon.state_dir.path());
    let status = second.wait().unwrap();
    assert!(status.success(), "loser must exit 0");

    let mut stderr = String::new();
    use std::io::Read;
    second.stderr.take().unwrap().read_to_string(&mut stderr).unwrap();
    assert!(
        stderr.contains("already running"),
        "stderr was: {stderr}"
    );

    // The loser did not touch the winner's metadata
    assert_eq!(daemon.metadata().unwrap(), meta_before);
}

#[test]
fn concurrent_launches_elect_exactly_one() {
    let state_dir = tempfile::tempdir().unwrap();

    let mut children: Vec<_> = (0..3)
        .map(|_| Daemon::spawn_into("http", state_dir.path()))
        .collect();

    // Wait until metadata appears and is reachable
    assert!(wait_until(STARTUP_WAIT, || {
        read_metadata(state_dir.path())
            .and_then(|m| m["pid"].as_u64())
            .is_some_and(|pid| process_exists(pid as u32))
    }));

    // Everyone except the owner exits 0
    let owner_pid = read_metadata(state_dir.path()).unwrap()["pid"].as_u64().unwrap() as u32;
    let mut survivors = 0;
    for child in &mut children {
        if child.id() == owner_pid {
            survivors += 1;
            continue;
        }
        let exited = wait_until(Duration::from_secs(5), || {
            matches!(child.try_wait(), Ok(Some(_)))
        });
        if exited {
            assert!(child.try_wait().unwrap().unwrap().success());
        } else {
            // Still running means it won the lock instead
            survivors += 1;
        }
    }
    assert_eq!(survivors, 1, "exactly one daemon may own the state dir");

    for mut child in children {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[test]
fn stale_lock_is_taken_over() {
    let state_dir = tempfile::tempdir().unwrap();
    // Fabricate a lock from a dead process
    std::fs::write(
        state_dir.path().join("daemon.lock"),
        serde_json::json!({
            "pid": 4_194_304,
            "startedAtMs": 0,
            "version": "0.0.1",
        })
        .to_string(),
    )
    .unwrap();

    let mut child = Daemon::spawn_into("http", state_dir.path());
    assert!(wait_until(STARTUP_WAIT, || {
        read_metadata(state_dir.path()).is_some()
    }));
    let meta = read_metadata(state_dir.path()).unwrap();
    assert_eq!(meta["pid"].as_u64().unwrap() as u32, child.id());

    let _ = child.kill();
    let _ = child.wait();
}
