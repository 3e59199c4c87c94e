// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers.
//!
//! All device tooling runs through [`run_cmd`]: bounded by a timeout,
//! cancellable mid-flight, with stdout/stderr captured. Fire-and-forget
//! launches (`emulator`, daemon relaunch) use [`run_cmd_detached`].

use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use ad_core::{CancelFlag, DaemonError};

/// Default command timeout when no profile applies.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Booting a cold Android emulator is the slowest thing we wait on.
pub const ANDROID_BOOT_TIMEOUT: Duration = Duration::from_secs(120);

/// `devicectl` talks to physical hardware and can stall on pairing.
pub const IOS_DEVICECTL_TIMEOUT: Duration = Duration::from_secs(60);

/// App launches, including first-launch install work.
pub const IOS_APP_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Finalizing a recording (SIGINT, flush, pull).
pub const RECORD_STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// Interval at which a running command re-checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Timeout for a named operation profile.
pub fn profile_timeout(profile: &str) -> Duration {
    match profile {
        "android_boot" => ANDROID_BOOT_TIMEOUT,
        "ios_devicectl" => IOS_DEVICECTL_TIMEOUT,
        "ios_app_launch" => IOS_APP_LAUNCH_TIMEOUT,
        "record_stop" => RECORD_STOP_TIMEOUT,
        _ => DEFAULT_TIMEOUT,
    }
}

/// Options for [`run_cmd`].
#[derive(Default)]
pub struct CmdOptions {
    pub env: Vec<(String, String)>,
    pub stdin: Option<String>,
    /// Treat a non-zero exit as a normal result instead of an error.
    pub allow_failure: bool,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelFlag>,
}

impl CmdOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }

    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self {
            cancel: Some(cancel),
            ..Default::default()
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run a command to completion with a deadline and cancellation.
///
/// On timeout or cancellation the child is killed (tokio kills on drop of
/// the spawned handle). A missing binary surfaces as `TOOL_MISSING`; a
/// non-zero exit surfaces as `COMMAND_FAILED` carrying stderr and the
/// exit code unless `allow_failure` is set.
pub async fn run_cmd(bin: &str, args: &[&str], opts: CmdOptions) -> Result<CmdOutput, DaemonError> {
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(if opts.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().map_err(|e| spawn_error(bin, &e))?;

    if let Some(input) = &opts.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| DaemonError::command_failed(format!("{bin}: stdin write failed: {e}")))?;
        }
    }

    let timeout = opts.timeout.unwrap_or(DEFAULT_TIMEOUT);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let wait = child.wait_with_output();
    tokio::pin!(wait);
    let mut poll = tokio::time::interval(CANCEL_POLL);

    let output = loop {
        tokio::select! {
            result = &mut wait => {
                break result.map_err(|e| {
                    DaemonError::command_failed(format!("{bin} failed: {e}"))
                })?;
            }
            _ = &mut deadline => {
                return Err(DaemonError::command_failed(format!(
                    "{bin} timed out after {}s",
                    timeout.as_secs()
                ))
                .with_details(json!({"cmd": render(bin, args), "timeoutMs": timeout.as_millis() as u64})));
            }
            _ = poll.tick() => {
                if opts.cancel.as_ref().is_some_and(CancelFlag::is_canceled) {
                    return Err(DaemonError::canceled());
                }
            }
        }
    };

    let result = CmdOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    };

    if !result.success() && !opts.allow_failure {
        return Err(DaemonError::command_failed(format!(
            "{bin} exited with status {}",
            result.exit_code
        ))
        .with_details(json!({
            "cmd": render(bin, args),
            "exitCode": result.exit_code,
            "stderr": result.stderr,
        })));
    }

    Ok(result)
}

/// Fire-and-forget launch; the child outlives the caller.
pub fn run_cmd_detached(
    bin: &str,
    args: &[&str],
    env: &[(String, String)],
) -> Result<u32, DaemonError> {
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    for (key, value) in env {
        cmd.env(key, value);
    }
    let child = cmd.spawn().map_err(|e| spawn_error(bin, &e))?;
    Ok(child.id().unwrap_or(0))
}

/// Synchronous variant used only at client bootstrap.
pub fn run_cmd_sync(bin: &str, args: &[&str]) -> Result<CmdOutput, DaemonError> {
    let output = std::process::Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(bin, &e))?;
    Ok(CmdOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

fn spawn_error(bin: &str, error: &std::io::Error) -> DaemonError {
    if error.kind() == std::io::ErrorKind::NotFound {
        DaemonError::tool_missing(bin)
    } else {
        DaemonError::command_failed(format!("failed to spawn {bin}: {error}"))
    }
}

fn render(bin: &str, args: &[&str]) -> String {
    let mut rendered = bin.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Bounded retry with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Retry `op` while `should_retry` approves the failure.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    should_retry: impl Fn(&DaemonError) -> bool,
    mut op: F,
) -> Result<T, DaemonError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, DaemonError>>,
{
    let mut last_error = None;
    for attempt in 0..policy.attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let retry = attempt + 1 < policy.attempts && should_retry(&error);
                last_error = Some(error);
                if !retry {
                    break;
                }
                let backoff = policy
                    .base_delay
                    .saturating_mul(1 << attempt.min(16))
                    .min(policy.max_delay);
                tokio::time::sleep(backoff + jitter()).await;
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DaemonError::command_failed("retry exhausted")))
}

fn jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(u64::from(nanos % 50))
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
