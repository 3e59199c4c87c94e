// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store: the name-to-session map and the process arena.
//!
//! Sessions are plain values; read-modify-write copies out under the
//! mutex. Recorder and log-streamer children are owned here, in an
//! arena keyed by id, so session values stay cloneable and handles are
//! reaped LIFO on close and shutdown.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::process::Child;
use tracing::{debug, info, warn};

use ad_backends::{orphans, process};
use ad_core::{encode_action, ActionRecord, Clock, DaemonError, Flags, Session};

struct ProcArena {
    next_id: u64,
    procs: BTreeMap<u64, Child>,
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    procs: Mutex<ProcArena>,
    state_dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(state_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            procs: Mutex::new(ProcArena {
                next_id: 1,
                procs: BTreeMap::new(),
            }),
            state_dir,
            clock,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join("sessions")
    }

    pub fn session_dir(&self, name: &str) -> PathBuf {
        self.sessions_dir().join(name)
    }

    /// Stable per-session app-log path.
    pub fn app_log_path(&self, name: &str) -> PathBuf {
        self.session_dir(name).join("app.log")
    }

    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        sessions
    }

    pub fn get(&self, name: &str) -> Option<Session> {
        self.sessions.lock().get(name).cloned()
    }

    /// Session currently bound to a device id, if any.
    pub fn device_owner(&self, device_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .values()
            .find(|s| s.device.id == device_id)
            .map(|s| s.name.clone())
    }

    /// Insert a new session; a device id can be bound to at most one.
    pub fn insert(&self, session: Session) -> Result<(), DaemonError> {
        let mut sessions = self.sessions.lock();
        if let Some(holder) = sessions
            .values()
            .find(|s| s.device.id == session.device.id && s.name != session.name)
        {
            return Err(DaemonError::device_in_use(&session.device.id, &holder.name));
        }
        sessions.insert(session.name.clone(), session);
        Ok(())
    }

    /// Copy out, mutate, copy back under the lock.
    pub fn update<R>(
        &self,
        name: &str,
        mutate: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, DaemonError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(name)
            .ok_or_else(|| DaemonError::session_not_found(name))?;
        Ok(mutate(session))
    }

    pub fn remove(&self, name: &str) -> Option<Session> {
        self.sessions.lock().remove(name)
    }

    /// Hand a child process to the arena; returns its id.
    pub fn store_proc(&self, child: Child) -> u64 {
        let mut arena = self.procs.lock();
        let id = arena.next_id;
        arena.next_id += 1;
        arena.procs.insert(id, child);
        id
    }

    pub fn take_proc(&self, id: u64) -> Option<Child> {
        self.procs.lock().procs.remove(&id)
    }

    /// Append an action to the journal.
    ///
    /// `open` results carry a `startup.durationMs` sample that feeds the
    /// perf ring.
    pub fn record_action(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        flags: &Flags,
        result: &Value,
    ) {
        let record = ActionRecord {
            command: command.to_string(),
            args: args.to_vec(),
            flags: flags.clone(),
            ok: true,
            at_ms: self.clock.now_ms(),
        };
        let startup = if command == "open" {
            result
                .get("startup")
                .and_then(|s| s.get("durationMs"))
                .and_then(Value::as_u64)
        } else {
            None
        };
        let _ = self.update(name, |session| {
            session.record(record);
            if let Some(sample) = startup {
                session.push_startup_sample(sample);
            }
        });
    }

    /// Serialize the journal as a replay script.
    ///
    /// An explicit target gets parent directories created; otherwise the
    /// script lands under the sessions directory with a timestamp.
    pub fn write_session_log(
        &self,
        session: &Session,
        target: Option<&Path>,
    ) -> Result<PathBuf, DaemonError> {
        let path = match target {
            Some(path) => path.to_path_buf(),
            None => self
                .sessions_dir()
                .join(format!("{}-{}.ad", session.name, self.clock.now_ms())),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DaemonError::command_failed(format!("cannot create script directory: {e}"))
            })?;
        }

        let mut script = String::new();
        for action in &session.journal {
            script.push_str(&encode_action(action));
            script.push('\n');
        }
        std::fs::write(&path, script)
            .map_err(|e| DaemonError::command_failed(format!("cannot write script: {e}")))?;
        info!(session = %session.name, path = %path.display(), "session journal written");
        Ok(path)
    }

    /// Rotate the app log when it outgrows the configured cap.
    pub fn rotate_app_log(&self, name: &str) {
        let log_path = self.app_log_path(name);
        let size = match log_path.metadata() {
            Ok(meta) => meta.len(),
            Err(_) => return,
        };
        if size < crate::env::app_log_max_bytes() {
            return;
        }
        let max_files = crate::env::app_log_max_files();
        let log_str = log_path.display().to_string();
        for i in (1..max_files).rev() {
            let _ = std::fs::rename(format!("{log_str}.{i}"), format!("{log_str}.{}", i + 1));
        }
        let _ = std::fs::rename(&log_path, format!("{log_str}.1"));
        debug!(session = name, "rotated app log");
    }

    /// Stop a child politely (SIGINT), then forcibly.
    pub async fn reap_proc(&self, id: u64) {
        let Some(mut child) = self.take_proc(id) else {
            return;
        };
        if let Some(pid) = child.id() {
            process::signal(pid, "-2");
        }
        if tokio::time::timeout(Duration::from_secs(2), child.wait())
            .await
            .is_err()
        {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }

    /// Reap every arena process, newest first.
    pub async fn reap_all_procs(&self) {
        loop {
            let id = {
                let arena = self.procs.lock();
                arena.procs.keys().next_back().copied()
            };
            match id {
                Some(id) => self.reap_proc(id).await,
                None => break,
            }
        }
    }

    /// Startup sweep: stop app-log streamers stranded by a previous
    /// daemon instance.
    pub async fn startup_sweep(&self) {
        let live: HashSet<String> = self
            .sessions
            .lock()
            .keys()
            .cloned()
            .collect();
        let stopped = orphans::sweep_app_log_orphans(&self.sessions_dir(), &live).await;
        if stopped > 0 {
            warn!(stopped, "stopped orphaned app-log streamers");
        }
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
