// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! iOS backend: simulators via `xcrun simctl`, physical devices via
//! `xcrun devicectl`, UI automation via `idb`.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use ad_core::{
    CancelFlag, DaemonError, DeviceDescriptor, DeviceKind, Platform, RecordingKind, Selector,
    TargetClass,
};

use crate::subprocess::{self, run_cmd, CmdOptions, CmdOutput};
use crate::{DeviceBackend, ExecCtx, Invocation, RecordingProc};

#[derive(Clone, Default)]
pub struct IosBackend;

impl IosBackend {
    pub fn new() -> Self {
        Self
    }

    async fn simctl(
        &self,
        set: Option<&Path>,
        args: &[&str],
        opts: CmdOptions,
    ) -> Result<CmdOutput, DaemonError> {
        let set_str = set.map(|p| p.to_string_lossy().to_string());
        let mut full: Vec<&str> = vec!["simctl"];
        if let Some(set) = set_str.as_deref() {
            full.push("--set");
            full.push(set);
        }
        full.extend_from_slice(args);
        run_cmd("xcrun", &full, opts).await
    }

    async fn idb_ui(
        &self,
        udid: &str,
        subcommand: &str,
        rest: &[&str],
        cancel: &CancelFlag,
    ) -> Result<CmdOutput, DaemonError> {
        let mut full: Vec<&str> = vec!["ui", subcommand, "--udid", udid];
        full.extend_from_slice(rest);
        run_cmd(
            "idb",
            &full,
            CmdOptions {
                cancel: Some(cancel.clone()),
                ..Default::default()
            },
        )
        .await
    }

    async fn describe(&self, udid: &str, cancel: &CancelFlag) -> Result<String, DaemonError> {
        let output = self
            .idb_ui(udid, "describe-all", &["--json"], cancel)
            .await?;
        Ok(output.stdout)
    }

    /// Resolve a tap point: either literal coordinates or an
    /// accessibility element matched by label.
    async fn resolve_point(
        &self,
        udid: &str,
        target: &str,
        cancel: &CancelFlag,
    ) -> Result<(i64, i64), DaemonError> {
        if let Some(point) = parse_coords(target) {
            return Ok(point);
        }
        let snapshot = self.describe(udid, cancel).await?;
        find_element(&snapshot, target)
            .and_then(element_center)
            .ok_or_else(|| {
                DaemonError::command_failed(format!("no element matching '{target}'"))
                    .with_hint("Run 'snapshot' to inspect the current accessibility tree.")
            })
    }

    async fn tap(
        &self,
        udid: &str,
        target: &str,
        duration: Option<f64>,
        cancel: &CancelFlag,
    ) -> Result<Value, DaemonError> {
        let (x, y) = self.resolve_point(udid, target, cancel).await?;
        let xs = x.to_string();
        let ys = y.to_string();
        let ds;
        let mut args: Vec<&str> = vec![&xs, &ys];
        if let Some(duration) = duration {
            ds = duration.to_string();
            args.push("--duration");
            args.push(&ds);
        }
        self.idb_ui(udid, "tap", &args, cancel).await?;
        Ok(json!({"tapped": target, "x": x, "y": y}))
    }

    async fn swipe(
        &self,
        udid: &str,
        from: (i64, i64),
        to: (i64, i64),
        cancel: &CancelFlag,
    ) -> Result<Value, DaemonError> {
        let coords = [
            from.0.to_string(),
            from.1.to_string(),
            to.0.to_string(),
            to.1.to_string(),
        ];
        let args: Vec<&str> = coords.iter().map(String::as_str).collect();
        self.idb_ui(udid, "swipe", &args, cancel).await?;
        Ok(json!({"swiped": {"from": [from.0, from.1], "to": [to.0, to.1]}}))
    }

    async fn launch_app(
        &self,
        device: &DeviceDescriptor,
        bundle: &str,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        let opts = CmdOptions {
            timeout: Some(subprocess::profile_timeout("ios_app_launch")),
            cancel: Some(ctx.cancel.clone()),
            ..Default::default()
        };
        if device.kind == DeviceKind::Device {
            let output = run_cmd(
                "xcrun",
                &[
                    "devicectl",
                    "device",
                    "process",
                    "launch",
                    "--device",
                    &device.id,
                    bundle,
                ],
                CmdOptions {
                    timeout: Some(subprocess::profile_timeout("ios_devicectl")),
                    cancel: Some(ctx.cancel.clone()),
                    ..Default::default()
                },
            )
            .await?;
            debug!(bundle, stdout = %output.stdout.trim(), "devicectl launch");
            return Ok(json!({"launched": bundle}));
        }

        let output = self
            .simctl(device.sim_set.as_deref(), &["launch", &device.id, bundle], opts)
            .await?;
        // `simctl launch` prints "<bundle>: <pid>"
        let pid = output
            .stdout
            .rsplit(':')
            .next()
            .and_then(|s| s.trim().parse::<u32>().ok());
        Ok(json!({"launched": bundle, "pid": pid}))
    }
}

#[async_trait]
impl DeviceBackend for IosBackend {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn discover(&self, selector: &Selector) -> Result<Vec<DeviceDescriptor>, DaemonError> {
        let set = selector.simulator_set.as_deref();
        let output = self
            .simctl(
                set,
                &["list", "devices", "-j"],
                CmdOptions::with_timeout(Duration::from_secs(15)),
            )
            .await?;

        let list: SimctlList = serde_json::from_str(&output.stdout).map_err(|e| {
            DaemonError::command_failed(format!("unparseable simctl output: {e}"))
        })?;

        let mut devices = Vec::new();
        for (runtime, sims) in list.devices {
            let target = if runtime.contains("tvOS") {
                TargetClass::Tv
            } else {
                TargetClass::Mobile
            };
            for sim in sims {
                if !sim.is_available {
                    continue;
                }
                devices.push(DeviceDescriptor {
                    platform: Platform::Ios,
                    id: sim.udid,
                    name: sim.name,
                    kind: DeviceKind::Simulator,
                    target,
                    booted: sim.state == "Booted",
                    sim_set: set.map(Path::to_path_buf),
                });
            }
        }

        // Physical devices only show up in the default scope
        if set.is_none() {
            devices.extend(discover_physical().await);
        }

        Ok(devices)
    }

    async fn boot(
        &self,
        device: &DeviceDescriptor,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        if device.kind != DeviceKind::Simulator {
            return Err(DaemonError::unsupported_operation("boot", &device.describe()));
        }
        if device.booted {
            return Ok(json!({"booted": device.id, "alreadyRunning": true}));
        }
        let set = device.sim_set.as_deref();
        let boot = self
            .simctl(
                set,
                &["boot", &device.id],
                CmdOptions {
                    allow_failure: true,
                    cancel: Some(ctx.cancel.clone()),
                    ..Default::default()
                },
            )
            .await?;
        if boot.exit_code != 0 && !boot.stderr.contains("current state: Booted") {
            return Err(DaemonError::command_failed(format!(
                "simctl boot exited with status {}",
                boot.exit_code
            ))
            .with_details(json!({"exitCode": boot.exit_code, "stderr": boot.stderr})));
        }
        self.simctl(
            set,
            &["bootstatus", &device.id, "-b"],
            CmdOptions {
                timeout: Some(Duration::from_secs(60)),
                cancel: Some(ctx.cancel.clone()),
                ..Default::default()
            },
        )
        .await?;
        info!(udid = %device.id, "simulator booted");
        Ok(json!({"booted": device.id}))
    }

    async fn run(
        &self,
        device: &DeviceDescriptor,
        invocation: &Invocation,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        ctx.ensure_not_canceled()?;
        let udid = device.id.as_str();
        let set = device.sim_set.as_deref();
        let cancel = &ctx.cancel;
        let args = &invocation.args;
        let first = args.first().map(String::as_str);

        match invocation.command.as_str() {
            "open" => {
                let bundle = ctx
                    .bundle_id
                    .as_deref()
                    .or(first)
                    .ok_or_else(|| DaemonError::invalid_args("open requires an app identifier"))?;
                self.launch_app(device, bundle, ctx).await
            }
            "close" => {
                let bundle = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("close requires an app identifier")
                })?;
                self.simctl(
                    set,
                    &["terminate", udid, bundle],
                    CmdOptions {
                        allow_failure: true,
                        cancel: Some(cancel.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                Ok(json!({"terminated": bundle}))
            }
            "screenshot" => {
                let out = ctx
                    .out
                    .as_deref()
                    .ok_or_else(|| DaemonError::invalid_args("screenshot requires --out"))?;
                if let Some(parent) = out.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                let out_str = out.to_string_lossy().to_string();
                self.simctl(
                    set,
                    &["io", udid, "screenshot", &out_str],
                    CmdOptions::with_cancel(cancel.clone()),
                )
                .await?;
                Ok(json!({"path": out_str}))
            }
            "snapshot" => {
                let tree = self.describe(udid, cancel).await?;
                Ok(json!({"snapshot": tree}))
            }
            "press" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("press requires a target"))?;
                self.tap(udid, target, None, cancel).await
            }
            "longpress" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("longpress requires a target"))?;
                let duration = invocation
                    .flags
                    .get_u64("durationMs")
                    .map(|ms| ms as f64 / 1000.0)
                    .unwrap_or(1.0);
                self.tap(udid, target, Some(duration), cancel).await
            }
            "focus" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("focus requires a target"))?;
                self.tap(udid, target, None, cancel).await
            }
            "type" => {
                let text = first.ok_or_else(|| DaemonError::invalid_args("type requires text"))?;
                self.idb_ui(udid, "text", &[text], cancel).await?;
                Ok(json!({"typed": text.len()}))
            }
            "fill" => {
                let (target, text) = match (args.first(), args.get(1)) {
                    (Some(target), Some(text)) => (target.as_str(), text.as_str()),
                    _ => {
                        return Err(DaemonError::invalid_args(
                            "fill requires a target and a value",
                        ))
                    }
                };
                self.tap(udid, target, None, cancel).await?;
                self.idb_ui(udid, "text", &[text], cancel).await?;
                Ok(json!({"filled": target}))
            }
            "swipe" | "scroll" => {
                let (from, to) = swipe_vector(args).ok_or_else(|| {
                    DaemonError::invalid_args(
                        "expected a direction (up/down/left/right) or two coordinate pairs",
                    )
                })?;
                self.swipe(udid, from, to, cancel).await
            }
            "scrollintoview" => {
                let target = first.ok_or_else(|| {
                    DaemonError::invalid_args("scrollintoview requires a target")
                })?;
                for _ in 0..10 {
                    ctx.ensure_not_canceled()?;
                    let snapshot = self.describe(udid, cancel).await?;
                    if find_element(&snapshot, target).is_some() {
                        return Ok(json!({"visible": target}));
                    }
                    self.swipe(udid, (200, 500), (200, 260), cancel).await?;
                }
                Err(DaemonError::command_failed(format!(
                    "'{target}' not visible after scrolling"
                )))
            }
            "back" => {
                // Edge swipe stands in for the missing hardware button
                self.swipe(udid, (2, 400), (320, 400), cancel).await?;
                Ok(json!({"back": "edge-swipe"}))
            }
            "home" => {
                self.idb_ui(udid, "button", &["HOME"], cancel).await?;
                Ok(json!({"pressed": "home"}))
            }
            "app-switcher" => {
                self.idb_ui(udid, "button", &["HOME"], cancel).await?;
                self.idb_ui(udid, "button", &["HOME"], cancel).await?;
                Ok(json!({"pressed": "app-switcher"}))
            }
            "pinch" => {
                self.swipe(udid, (160, 400), (80, 400), cancel).await?;
                self.swipe(udid, (240, 400), (320, 400), cancel).await?;
                Ok(json!({"pinched": true}))
            }
            "wait" => wait_for(self, udid, args, &invocation.flags, cancel).await,
            "find" | "is" | "get" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("a target query is required"))?;
                let snapshot = self.describe(udid, cancel).await?;
                let matches = find_all(&snapshot, target);
                match invocation.command.as_str() {
                    "is" => Ok(json!({"found": !matches.is_empty()})),
                    "get" => Ok(json!({"element": matches.first()})),
                    _ => Ok(json!({"matches": matches})),
                }
            }
            "alert" => {
                let action = first.unwrap_or("accept");
                let label = match action {
                    "accept" => "OK",
                    "dismiss" => "Cancel",
                    other => other,
                };
                self.tap(udid, label, None, cancel).await?;
                Ok(json!({"alert": action}))
            }
            "settings" => ios_settings(self, device, args, cancel).await,
            "push" => {
                let bundle = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("push requires an app identifier")
                })?;
                let payload = invocation
                    .flags
                    .get_str("payload")
                    .map(String::from)
                    .or_else(|| args.get(1).cloned())
                    .ok_or_else(|| DaemonError::invalid_args("push requires a payload"))?;
                self.simctl(
                    set,
                    &["push", udid, bundle, "-"],
                    CmdOptions {
                        stdin: Some(payload),
                        cancel: Some(cancel.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                Ok(json!({"pushed": bundle}))
            }
            "clipboard" => match first {
                Some("set") => {
                    let text = args
                        .get(1)
                        .ok_or_else(|| DaemonError::invalid_args("clipboard set requires text"))?;
                    self.simctl(
                        set,
                        &["pbcopy", udid],
                        CmdOptions {
                            stdin: Some(text.clone()),
                            cancel: Some(cancel.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                    Ok(json!({"set": true}))
                }
                _ => {
                    let output = self
                        .simctl(set, &["pbpaste", udid], CmdOptions::with_cancel(cancel.clone()))
                        .await?;
                    Ok(json!({"text": output.stdout}))
                }
            },
            "apps" => {
                let output = self
                    .simctl(set, &["listapps", udid], CmdOptions::with_cancel(cancel.clone()))
                    .await?;
                Ok(json!({"bundles": parse_listapps(&output.stdout)}))
            }
            "appstate" => {
                let bundle = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("appstate requires an app identifier")
                })?;
                let output = self
                    .simctl(
                        set,
                        &["spawn", udid, "launchctl", "list"],
                        CmdOptions {
                            allow_failure: true,
                            cancel: Some(cancel.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                let running = output.stdout.contains(bundle);
                Ok(json!({"app": bundle, "state": if running { "running" } else { "stopped" }}))
            }
            "reinstall" => {
                let app_path = invocation
                    .flags
                    .get_str("path")
                    .ok_or_else(|| DaemonError::invalid_args("reinstall requires --path"))?;
                let bundle = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("reinstall requires an app identifier")
                })?;
                self.simctl(
                    set,
                    &["uninstall", udid, bundle],
                    CmdOptions {
                        allow_failure: true,
                        cancel: Some(cancel.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                self.simctl(
                    set,
                    &["install", udid, app_path],
                    CmdOptions::with_cancel(cancel.clone()),
                )
                .await?;
                Ok(json!({"reinstalled": bundle}))
            }
            "openurl" => {
                let url = first.ok_or_else(|| DaemonError::invalid_args("a URL is required"))?;
                self.simctl(set, &["openurl", udid, url], CmdOptions::with_cancel(cancel.clone()))
                    .await?;
                Ok(json!({"opened": url}))
            }
            "network" => {
                let condition = first.unwrap_or("reset");
                if condition == "reset" {
                    self.simctl(
                        set,
                        &["status_bar", udid, "clear"],
                        CmdOptions::with_cancel(cancel.clone()),
                    )
                    .await?;
                } else {
                    self.simctl(
                        set,
                        &["status_bar", udid, "override", "--dataNetwork", condition],
                        CmdOptions::with_cancel(cancel.clone()),
                    )
                    .await?;
                }
                Ok(json!({"network": condition}))
            }
            other => Err(DaemonError::command_failed(format!(
                "no iOS handler for '{other}'"
            ))),
        }
    }

    /// The companion process hosts UI automation for one target; the
    /// `idb ui` one-shots above attach to it. It keeps running between
    /// commands, so the daemon supervises it as a runner session.
    async fn start_runner(
        &self,
        device: &DeviceDescriptor,
    ) -> Result<Option<tokio::process::Child>, DaemonError> {
        let child = tokio::process::Command::new("idb_companion")
            .arg("--udid")
            .arg(&device.id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DaemonError::tool_missing("idb_companion")
                } else {
                    DaemonError::command_failed(format!("failed to start runner host: {e}"))
                }
            })?;
        info!(udid = %device.id, "runner host started");
        Ok(Some(child))
    }

    async fn start_recording(
        &self,
        device: &DeviceDescriptor,
        output: &Path,
    ) -> Result<RecordingProc, DaemonError> {
        if let Some(parent) = output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let mut cmd = tokio::process::Command::new("xcrun");
        if let Some(set) = device.sim_set.as_deref() {
            cmd.arg("simctl").arg("--set").arg(set);
        } else {
            cmd.arg("simctl");
        }
        cmd.arg("io")
            .arg(&device.id)
            .arg("recordVideo")
            .arg("--codec")
            .arg("h264")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DaemonError::tool_missing("xcrun")
            } else {
                DaemonError::command_failed(format!("failed to start recording: {e}"))
            }
        })?;
        Ok(RecordingProc {
            child,
            kind: RecordingKind::SimulatorVideo,
            remote: None,
        })
    }

    async fn stop_recording(
        &self,
        _device: &DeviceDescriptor,
        child: &mut tokio::process::Child,
        _remote: Option<&str>,
        output: &Path,
    ) -> Result<Value, DaemonError> {
        // recordVideo finalizes the file on SIGINT, not SIGKILL
        if let Some(pid) = child.id() {
            crate::process::signal(pid, "-2");
        }
        let waited = tokio::time::timeout(subprocess::RECORD_STOP_TIMEOUT, child.wait()).await;
        if waited.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        let size = output.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(json!({"path": output.to_string_lossy(), "bytes": size}))
    }

    async fn start_app_log(
        &self,
        device: &DeviceDescriptor,
        bundle_id: Option<&str>,
        output: &Path,
    ) -> Result<tokio::process::Child, DaemonError> {
        if let Some(parent) = output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::File::create(output)
            .map_err(|e| DaemonError::command_failed(format!("cannot create app log: {e}")))?;

        let mut cmd = tokio::process::Command::new("xcrun");
        if let Some(set) = device.sim_set.as_deref() {
            cmd.arg("simctl").arg("--set").arg(set);
        } else {
            cmd.arg("simctl");
        }
        cmd.arg("spawn")
            .arg(&device.id)
            .arg("log")
            .arg("stream")
            .arg("--style")
            .arg("compact");
        if let Some(bundle) = bundle_id {
            cmd.arg("--predicate")
                .arg(format!("subsystem CONTAINS \"{bundle}\""));
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DaemonError::tool_missing("xcrun")
            } else {
                DaemonError::command_failed(format!("failed to start log stream: {e}"))
            }
        })
    }
}

#[derive(Deserialize)]
struct SimctlList {
    devices: HashMap<String, Vec<SimctlDevice>>,
}

#[derive(Deserialize)]
struct SimctlDevice {
    udid: String,
    name: String,
    state: String,
    #[serde(rename = "isAvailable", default)]
    is_available: bool,
}

/// Physical devices from `xcrun xctrace list devices`.
///
/// Lines look like `NghiPhone (18.5) (00008020-0012446C1ADA002E)`; the
/// UDID is the last parenthesized token.
async fn discover_physical() -> Vec<DeviceDescriptor> {
    let output = match run_cmd(
        "xcrun",
        &["xctrace", "list", "devices"],
        CmdOptions {
            allow_failure: true,
            timeout: Some(Duration::from_secs(15)),
            ..Default::default()
        },
    )
    .await
    {
        Ok(output) if output.success() => output,
        _ => return Vec::new(),
    };

    let mut devices = Vec::new();
    let mut in_devices = false;
    for line in output.stdout.lines() {
        let trimmed = line.trim();
        if trimmed == "== Devices ==" {
            in_devices = true;
            continue;
        }
        if trimmed.starts_with("==") {
            in_devices = false;
            continue;
        }
        if !in_devices || trimmed.is_empty() {
            continue;
        }
        if let Some(device) = parse_xctrace_line(trimmed) {
            devices.push(device);
        }
    }
    devices
}

fn parse_xctrace_line(line: &str) -> Option<DeviceDescriptor> {
    let end = line.rfind(')')?;
    let start = line[..end].rfind('(')?;
    let udid = &line[start + 1..end];
    if udid.len() < 20 || !udid.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return None;
    }
    let name = line[..start].trim();
    // Strip the trailing "(version)" group from the name when present
    let name = match name.rfind('(') {
        Some(i) => name[..i].trim(),
        None => name,
    };
    if name.to_ascii_lowercase().contains("mac") {
        return None;
    }
    Some(DeviceDescriptor {
        platform: Platform::Ios,
        id: udid.to_string(),
        name: name.to_string(),
        kind: DeviceKind::Device,
        target: if name.contains("Apple TV") {
            TargetClass::Tv
        } else {
            TargetClass::Mobile
        },
        booted: true,
        sim_set: None,
    })
}

fn parse_coords(target: &str) -> Option<(i64, i64)> {
    let (x, y) = target.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Find the first accessibility element whose label or identifier
/// matches the query, case-insensitively.
fn find_element(snapshot: &str, query: &str) -> Option<Value> {
    find_all(snapshot, query).into_iter().next()
}

fn find_all(snapshot: &str, query: &str) -> Vec<Value> {
    let needle = query.to_ascii_lowercase();
    let elements: Vec<Value> = match serde_json::from_str::<Value>(snapshot) {
        Ok(Value::Array(items)) => items,
        _ => snapshot
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect(),
    };
    elements
        .into_iter()
        .filter(|element| {
            ["AXLabel", "AXIdentifier", "AXValue"].iter().any(|key| {
                element
                    .get(key)
                    .and_then(Value::as_str)
                    .is_some_and(|v| v.to_ascii_lowercase().contains(&needle))
            })
        })
        .collect()
}

fn element_center(element: Value) -> Option<(i64, i64)> {
    let frame = element.get("frame")?;
    let x = frame.get("x")?.as_f64()?;
    let y = frame.get("y")?.as_f64()?;
    let w = frame.get("width")?.as_f64()?;
    let h = frame.get("height")?.as_f64()?;
    Some(((x + w / 2.0) as i64, (y + h / 2.0) as i64))
}

fn swipe_vector(args: &[String]) -> Option<((i64, i64), (i64, i64))> {
    match args.first().map(String::as_str) {
        Some("up") => Some(((200, 500), (200, 220))),
        Some("down") => Some(((200, 220), (200, 500))),
        Some("left") => Some(((300, 400), (60, 400))),
        Some("right") => Some(((60, 400), (300, 400))),
        _ => {
            if args.len() >= 4 {
                let mut nums = args.iter().filter_map(|a| a.parse::<i64>().ok());
                let (x1, y1, x2, y2) = (nums.next()?, nums.next()?, nums.next()?, nums.next()?);
                Some(((x1, y1), (x2, y2)))
            } else {
                None
            }
        }
    }
}

async fn wait_for(
    backend: &IosBackend,
    udid: &str,
    args: &[String],
    flags: &ad_core::Flags,
    cancel: &CancelFlag,
) -> Result<Value, DaemonError> {
    let first = args.first().map(String::as_str);
    if let Some(ms) = first.and_then(|s| s.parse::<u64>().ok()) {
        let deadline = std::time::Instant::now() + Duration::from_millis(ms);
        while std::time::Instant::now() < deadline {
            if cancel.is_canceled() {
                return Err(DaemonError::canceled());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        return Ok(json!({"waitedMs": ms}));
    }

    let target = first.ok_or_else(|| {
        DaemonError::invalid_args("wait requires a duration in ms or a target")
    })?;
    let timeout_ms = flags.get_u64("timeoutMs").unwrap_or(10_000);
    let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if cancel.is_canceled() {
            return Err(DaemonError::canceled());
        }
        let snapshot = backend.describe(udid, cancel).await?;
        if find_element(&snapshot, target).is_some() {
            return Ok(json!({"found": target}));
        }
        if std::time::Instant::now() >= deadline {
            return Err(DaemonError::command_failed(format!(
                "timed out waiting for '{target}'"
            )));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn ios_settings(
    backend: &IosBackend,
    device: &DeviceDescriptor,
    args: &[String],
    cancel: &CancelFlag,
) -> Result<Value, DaemonError> {
    let set = device.sim_set.as_deref();
    match args.first().map(String::as_str) {
        Some("appearance") => {
            let mode = args
                .get(1)
                .ok_or_else(|| DaemonError::invalid_args("appearance requires light|dark"))?;
            backend
                .simctl(
                    set,
                    &["ui", &device.id, "appearance", mode],
                    CmdOptions::with_cancel(cancel.clone()),
                )
                .await?;
            Ok(json!({"appearance": mode}))
        }
        Some("privacy") => {
            let (action, service, bundle) = match (args.get(1), args.get(2), args.get(3)) {
                (Some(a), Some(s), Some(b)) => (a.as_str(), s.as_str(), b.as_str()),
                _ => {
                    return Err(DaemonError::invalid_args(
                        "privacy requires grant|revoke, a service, and an app identifier",
                    ))
                }
            };
            backend
                .simctl(
                    set,
                    &["privacy", &device.id, action, service, bundle],
                    CmdOptions::with_cancel(cancel.clone()),
                )
                .await?;
            Ok(json!({"privacy": {"action": action, "service": service}}))
        }
        _ => Err(DaemonError::invalid_args(
            "settings requires a domain: appearance or privacy",
        )),
    }
}

/// Bundle ids out of `simctl listapps` plist-style output.
fn parse_listapps(raw: &str) -> Vec<String> {
    raw.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let rest = trimmed.strip_prefix('"')?;
            let (bundle, tail) = rest.split_once('"')?;
            if tail.trim_start().starts_with('=') && bundle.contains('.') {
                Some(bundle.to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "ios_tests.rs"]
mod tests;
