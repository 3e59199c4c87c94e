// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request diagnostic scopes.
//!
//! Handlers record structured events into a rolling buffer. On success
//! the buffer is dropped unless the request asked for debug; on failure
//! it is flushed to `<state-dir>/logs/<session>/<date>/<ts>-<id>.ndjson`
//! after redaction, and the error carries the diagnostic id + path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_json::{json, Value};
use tracing::warn;

use ad_core::{redact_value, Clock};

/// Rolling event cap per request.
const EVENT_CAP: usize = 256;

pub struct DiagScope {
    pub session: String,
    pub command: String,
    pub request_id: String,
    pub debug: bool,
    diag_id: String,
    events: Vec<Value>,
    started: Instant,
    started_at_ms: u64,
}

impl DiagScope {
    pub fn new(
        session: &str,
        command: &str,
        request_id: &str,
        debug: bool,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            session: session.to_string(),
            command: command.to_string(),
            request_id: request_id.to_string(),
            debug,
            diag_id: uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
            events: Vec::new(),
            started: Instant::now(),
            started_at_ms: clock.now_ms(),
        }
    }

    pub fn diag_id(&self) -> &str {
        &self.diag_id
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Record one structured event.
    pub fn event(&mut self, level: &str, phase: &str, data: Value) {
        if self.events.len() >= EVENT_CAP {
            self.events.remove(0);
        }
        self.events.push(json!({
            "level": level,
            "phase": phase,
            "elapsedMs": self.elapsed_ms(),
            "data": data,
        }));
    }

    /// Time an async block, bracketing it with start/end events.
    pub async fn time<T, F>(&mut self, phase: &str, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let start = Instant::now();
        self.event("debug", &format!("{phase}_start"), Value::Null);
        let result = fut.await;
        self.event(
            "debug",
            &format!("{phase}_end"),
            json!({"durationMs": start.elapsed().as_millis() as u64}),
        );
        result
    }

    /// Flush buffered events to an ndjson file; returns the path.
    ///
    /// Every event is redacted on the way out. Failures to write are
    /// logged and swallowed: diagnostics never break a response.
    pub fn flush(&self, logs_dir: &Path) -> Option<PathBuf> {
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let dir = logs_dir.join(&self.session).join(date);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(error = %e, "cannot create diagnostics directory");
            return None;
        }
        let path = dir.join(format!("{}-{}.ndjson", self.started_at_ms, self.diag_id));

        let mut file = match std::fs::File::create(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "cannot create diagnostics file");
                return None;
            }
        };

        let header = json!({
            "level": "info",
            "phase": "request",
            "data": {
                "session": self.session,
                "command": self.command,
                "requestId": self.request_id,
                "diagnosticId": self.diag_id,
            },
        });
        let mut lines = vec![header];
        lines.extend(self.events.iter().cloned());

        for mut line in lines {
            redact_value(&mut line);
            let Ok(serialized) = serde_json::to_string(&line) else {
                continue;
            };
            if writeln!(file, "{serialized}").is_err() {
                break;
            }
        }
        Some(path)
    }
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
