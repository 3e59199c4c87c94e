// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Android backend: emulators and physical hardware via `adb`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use ad_core::{
    CancelFlag, DaemonError, DeviceDescriptor, DeviceKind, Platform, RecordingKind, Selector,
    TargetClass,
};

use crate::subprocess::{self, run_cmd, CmdOptions, CmdOutput};
use crate::{DeviceBackend, ExecCtx, Invocation, RecordingProc};

/// On-device scratch path for recordings before they are pulled.
const REMOTE_RECORDING: &str = "/sdcard/agent-device-recording.mp4";
const REMOTE_SCREENSHOT: &str = "/sdcard/agent-device-screenshot.png";
const REMOTE_UI_DUMP: &str = "/sdcard/agent-device-ui.xml";

#[derive(Clone, Default)]
pub struct AndroidBackend;

impl AndroidBackend {
    pub fn new() -> Self {
        Self
    }

    async fn adb(
        &self,
        serial: &str,
        args: &[&str],
        opts: CmdOptions,
    ) -> Result<CmdOutput, DaemonError> {
        let mut full: Vec<&str> = vec!["-s", serial];
        full.extend_from_slice(args);
        run_cmd("adb", &full, opts).await
    }

    async fn shell(
        &self,
        serial: &str,
        args: &[&str],
        cancel: &CancelFlag,
    ) -> Result<CmdOutput, DaemonError> {
        let mut full: Vec<&str> = vec!["shell"];
        full.extend_from_slice(args);
        self.adb(serial, &full, CmdOptions::with_cancel(cancel.clone()))
            .await
    }

    async fn ui_dump(&self, serial: &str, cancel: &CancelFlag) -> Result<String, DaemonError> {
        self.shell(serial, &["uiautomator", "dump", REMOTE_UI_DUMP], cancel)
            .await?;
        let output = self.shell(serial, &["cat", REMOTE_UI_DUMP], cancel).await?;
        Ok(output.stdout)
    }

    async fn tap_target(
        &self,
        serial: &str,
        target: &str,
        long: bool,
        cancel: &CancelFlag,
    ) -> Result<Value, DaemonError> {
        let (x, y) = match parse_coords(target) {
            Some(point) => point,
            None => {
                let dump = self.ui_dump(serial, cancel).await?;
                find_node_center(&dump, target).ok_or_else(|| {
                    DaemonError::command_failed(format!("no element matching '{target}'"))
                        .with_hint("Run 'snapshot' to inspect the current UI hierarchy.")
                })?
            }
        };
        let xs = x.to_string();
        let ys = y.to_string();
        if long {
            // A zero-distance swipe with a hold is a long press
            self.shell(
                serial,
                &["input", "swipe", &xs, &ys, &xs, &ys, "800"],
                cancel,
            )
            .await?;
        } else {
            self.shell(serial, &["input", "tap", &xs, &ys], cancel).await?;
        }
        Ok(json!({"tapped": target, "x": x, "y": y}))
    }
}

#[async_trait]
impl DeviceBackend for AndroidBackend {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn discover(&self, _selector: &Selector) -> Result<Vec<DeviceDescriptor>, DaemonError> {
        let output = run_cmd(
            "adb",
            &["devices", "-l"],
            CmdOptions::with_timeout(Duration::from_secs(15)),
        )
        .await?;
        Ok(parse_adb_devices(&output.stdout))
    }

    async fn boot(
        &self,
        device: &DeviceDescriptor,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        if device.booted {
            return Ok(json!({"booted": device.id, "alreadyRunning": true}));
        }
        if device.kind != DeviceKind::Emulator {
            return Err(DaemonError::command_failed(
                "cannot boot a physical Android device",
            ));
        }
        // The emulator binary stays alive for the emulator's lifetime
        let avd = device.name.replace(' ', "_");
        subprocess::run_cmd_detached("emulator", &["-avd", &avd], &[])?;
        self.adb(
            &device.id,
            &["wait-for-device"],
            CmdOptions {
                timeout: Some(subprocess::profile_timeout("android_boot")),
                cancel: Some(ctx.cancel.clone()),
                ..Default::default()
            },
        )
        .await?;
        info!(serial = %device.id, "emulator booted");
        Ok(json!({"booted": device.id}))
    }

    async fn run(
        &self,
        device: &DeviceDescriptor,
        invocation: &Invocation,
        ctx: &ExecCtx,
    ) -> Result<Value, DaemonError> {
        ctx.ensure_not_canceled()?;
        let serial = device.id.as_str();
        let cancel = &ctx.cancel;
        let args = &invocation.args;
        let first = args.first().map(String::as_str);

        match invocation.command.as_str() {
            "open" => {
                let package = ctx
                    .bundle_id
                    .as_deref()
                    .or(first)
                    .ok_or_else(|| DaemonError::invalid_args("open requires a package name"))?;
                self.shell(
                    serial,
                    &[
                        "monkey",
                        "-p",
                        package,
                        "-c",
                        "android.intent.category.LAUNCHER",
                        "1",
                    ],
                    cancel,
                )
                .await?;
                Ok(json!({"launched": package}))
            }
            "close" => {
                let package = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("close requires a package name")
                })?;
                self.shell(serial, &["am", "force-stop", package], cancel)
                    .await?;
                Ok(json!({"terminated": package}))
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
                self.shell(serial, &["screencap", "-p", REMOTE_SCREENSHOT], cancel)
                    .await?;
                self.adb(
                    serial,
                    &["pull", REMOTE_SCREENSHOT, &out_str],
                    CmdOptions::with_cancel(cancel.clone()),
                )
                .await?;
                self.shell(serial, &["rm", "-f", REMOTE_SCREENSHOT], cancel)
                    .await?;
                Ok(json!({"path": out_str}))
            }
            "snapshot" => {
                let dump = self.ui_dump(serial, cancel).await?;
                Ok(json!({"snapshot": dump}))
            }
            "press" | "focus" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("press requires a target"))?;
                self.tap_target(serial, target, false, cancel).await
            }
            "longpress" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("longpress requires a target"))?;
                self.tap_target(serial, target, true, cancel).await
            }
            "type" => {
                let text = first.ok_or_else(|| DaemonError::invalid_args("type requires text"))?;
                let encoded = encode_input_text(text);
                self.shell(serial, &["input", "text", &encoded], cancel)
                    .await?;
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
                self.tap_target(serial, target, false, cancel).await?;
                let encoded = encode_input_text(text);
                self.shell(serial, &["input", "text", &encoded], cancel)
                    .await?;
                Ok(json!({"filled": target}))
            }
            "swipe" | "scroll" => {
                let ((x1, y1), (x2, y2)) = swipe_vector(args).ok_or_else(|| {
                    DaemonError::invalid_args(
                        "expected a direction (up/down/left/right) or two coordinate pairs",
                    )
                })?;
                self.shell(
                    serial,
                    &[
                        "input",
                        "swipe",
                        &x1.to_string(),
                        &y1.to_string(),
                        &x2.to_string(),
                        &y2.to_string(),
                    ],
                    cancel,
                )
                .await?;
                Ok(json!({"swiped": {"from": [x1, y1], "to": [x2, y2]}}))
            }
            "scrollintoview" => {
                let target = first.ok_or_else(|| {
                    DaemonError::invalid_args("scrollintoview requires a target")
                })?;
                for _ in 0..10 {
                    ctx.ensure_not_canceled()?;
                    let dump = self.ui_dump(serial, cancel).await?;
                    if find_node_center(&dump, target).is_some() {
                        return Ok(json!({"visible": target}));
                    }
                    self.shell(
                        serial,
                        &["input", "swipe", "500", "1400", "500", "600"],
                        cancel,
                    )
                    .await?;
                }
                Err(DaemonError::command_failed(format!(
                    "'{target}' not visible after scrolling"
                )))
            }
            "back" => {
                self.shell(serial, &["input", "keyevent", "4"], cancel).await?;
                Ok(json!({"pressed": "back"}))
            }
            "home" => {
                self.shell(serial, &["input", "keyevent", "3"], cancel).await?;
                Ok(json!({"pressed": "home"}))
            }
            "app-switcher" => {
                self.shell(serial, &["input", "keyevent", "187"], cancel)
                    .await?;
                Ok(json!({"pressed": "app-switcher"}))
            }
            "keyboard" => {
                let key = first
                    .ok_or_else(|| DaemonError::invalid_args("keyboard requires a key name"))?;
                let code = keyevent_code(key).ok_or_else(|| {
                    DaemonError::invalid_args(format!("unknown key '{key}'"))
                })?;
                self.shell(serial, &["input", "keyevent", code], cancel)
                    .await?;
                Ok(json!({"key": key}))
            }
            "wait" => {
                let first = first.ok_or_else(|| {
                    DaemonError::invalid_args("wait requires a duration in ms or a target")
                })?;
                if let Ok(ms) = first.parse::<u64>() {
                    let deadline = std::time::Instant::now() + Duration::from_millis(ms);
                    while std::time::Instant::now() < deadline {
                        ctx.ensure_not_canceled()?;
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                    return Ok(json!({"waitedMs": ms}));
                }
                let timeout_ms = invocation.flags.get_u64("timeoutMs").unwrap_or(10_000);
                let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
                loop {
                    ctx.ensure_not_canceled()?;
                    let dump = self.ui_dump(serial, cancel).await?;
                    if dump.to_ascii_lowercase().contains(&first.to_ascii_lowercase()) {
                        return Ok(json!({"found": first}));
                    }
                    if std::time::Instant::now() >= deadline {
                        return Err(DaemonError::command_failed(format!(
                            "timed out waiting for '{first}'"
                        )));
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
            }
            "find" | "is" | "get" => {
                let target = first
                    .ok_or_else(|| DaemonError::invalid_args("a target query is required"))?;
                let dump = self.ui_dump(serial, cancel).await?;
                let matches = find_nodes(&dump, target);
                match invocation.command.as_str() {
                    "is" => Ok(json!({"found": !matches.is_empty()})),
                    "get" => Ok(json!({"element": matches.first()})),
                    _ => Ok(json!({"matches": matches})),
                }
            }
            "settings" => {
                match (args.first(), args.get(1), args.get(2)) {
                    (Some(namespace), Some(key), Some(value)) => {
                        self.shell(serial, &["settings", "put", namespace, key, value], cancel)
                            .await?;
                        Ok(json!({"set": {"namespace": namespace, "key": key}}))
                    }
                    (Some(namespace), Some(key), None) => {
                        let output = self
                            .shell(serial, &["settings", "get", namespace, key], cancel)
                            .await?;
                        Ok(json!({"value": output.stdout.trim()}))
                    }
                    _ => Err(DaemonError::invalid_args(
                        "settings requires a namespace and key",
                    )),
                }
            }
            "clipboard" => match first {
                Some("set") => {
                    let text = args
                        .get(1)
                        .ok_or_else(|| DaemonError::invalid_args("clipboard set requires text"))?;
                    self.shell(serial, &["cmd", "clipboard", "set-text", text], cancel)
                        .await?;
                    Ok(json!({"set": true}))
                }
                _ => {
                    let output = self
                        .shell(serial, &["cmd", "clipboard", "get-text"], cancel)
                        .await?;
                    Ok(json!({"text": output.stdout.trim()}))
                }
            },
            "push" => {
                let package = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("push requires a package name")
                })?;
                let text = invocation
                    .flags
                    .get_str("payload")
                    .map(String::from)
                    .or_else(|| args.get(1).cloned())
                    .unwrap_or_else(|| "test notification".to_string());
                self.shell(
                    serial,
                    &[
                        "cmd",
                        "notification",
                        "post",
                        "-t",
                        &text,
                        "agent-device",
                        package,
                    ],
                    cancel,
                )
                .await?;
                Ok(json!({"pushed": package}))
            }
            "apps" => {
                let output = self
                    .shell(serial, &["pm", "list", "packages", "-3"], cancel)
                    .await?;
                let packages: Vec<&str> = output
                    .stdout
                    .lines()
                    .filter_map(|line| line.trim().strip_prefix("package:"))
                    .collect();
                Ok(json!({"bundles": packages}))
            }
            "appstate" => {
                let package = ctx.bundle_id.as_deref().or(first).ok_or_else(|| {
                    DaemonError::invalid_args("appstate requires a package name")
                })?;
                let output = self
                    .adb(
                        serial,
                        &["shell", "pidof", package],
                        CmdOptions {
                            allow_failure: true,
                            cancel: Some(cancel.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
                let running = !output.stdout.trim().is_empty();
                Ok(json!({"app": package, "state": if running { "running" } else { "stopped" }}))
            }
            "reinstall" => {
                let apk = invocation
                    .flags
                    .get_str("path")
                    .ok_or_else(|| DaemonError::invalid_args("reinstall requires --path"))?;
                self.adb(
                    serial,
                    &["install", "-r", apk],
                    CmdOptions {
                        timeout: Some(Duration::from_secs(120)),
                        cancel: Some(cancel.clone()),
                        ..Default::default()
                    },
                )
                .await?;
                Ok(json!({"reinstalled": apk}))
            }
            "openurl" => {
                let url = first.ok_or_else(|| DaemonError::invalid_args("a URL is required"))?;
                self.shell(
                    serial,
                    &["am", "start", "-a", "android.intent.action.VIEW", "-d", url],
                    cancel,
                )
                .await?;
                Ok(json!({"opened": url}))
            }
            "network" => {
                let condition = first.unwrap_or("reset");
                match condition {
                    "off" => {
                        self.shell(serial, &["svc", "wifi", "disable"], cancel).await?;
                        self.shell(serial, &["svc", "data", "disable"], cancel).await?;
                    }
                    _ => {
                        self.shell(serial, &["svc", "wifi", "enable"], cancel).await?;
                        self.shell(serial, &["svc", "data", "enable"], cancel).await?;
                    }
                }
                Ok(json!({"network": condition}))
            }
            other => Err(DaemonError::command_failed(format!(
                "no Android handler for '{other}'"
            ))),
        }
    }

    async fn start_recording(
        &self,
        device: &DeviceDescriptor,
        output: &Path,
    ) -> Result<RecordingProc, DaemonError> {
        if let Some(parent) = output.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let child = tokio::process::Command::new("adb")
            .args(["-s", &device.id, "shell", "screenrecord", REMOTE_RECORDING])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    DaemonError::tool_missing("adb")
                } else {
                    DaemonError::command_failed(format!("failed to start recording: {e}"))
                }
            })?;
        Ok(RecordingProc {
            child,
            kind: RecordingKind::Screenrecord,
            remote: Some(REMOTE_RECORDING.to_string()),
        })
    }

    async fn stop_recording(
        &self,
        device: &DeviceDescriptor,
        child: &mut tokio::process::Child,
        remote: Option<&str>,
        output: &Path,
    ) -> Result<Value, DaemonError> {
        // screenrecord finalizes on SIGINT of the adb client
        if let Some(pid) = child.id() {
            crate::process::signal(pid, "-2");
        }
        let waited = tokio::time::timeout(subprocess::RECORD_STOP_TIMEOUT, child.wait()).await;
        if waited.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        // Give the on-device muxer a moment to close the file
        tokio::time::sleep(Duration::from_millis(500)).await;

        let remote = remote.unwrap_or(REMOTE_RECORDING);
        let out_str = output.to_string_lossy().to_string();
        self.adb(
            &device.id,
            &["pull", remote, &out_str],
            CmdOptions::with_timeout(subprocess::RECORD_STOP_TIMEOUT),
        )
        .await?;
        self.adb(
            &device.id,
            &["shell", "rm", "-f", remote],
            CmdOptions {
                allow_failure: true,
                ..Default::default()
            },
        )
        .await?;
        let size = output.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(json!({"path": out_str, "bytes": size}))
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

        let mut args: Vec<String> =
            vec!["-s".into(), device.id.clone(), "logcat".into(), "-v".into(), "time".into()];
        if let Some(package) = bundle_id {
            // Scope to the app's pid when it is running
            let pid_out = run_cmd(
                "adb",
                &["-s", &device.id, "shell", "pidof", package],
                CmdOptions {
                    allow_failure: true,
                    timeout: Some(Duration::from_secs(10)),
                    ..Default::default()
                },
            )
            .await?;
            let pid = pid_out.stdout.trim().split(' ').next().unwrap_or("").to_string();
            if !pid.is_empty() {
                args.push("--pid".into());
                args.push(pid);
            }
        }

        let mut cmd = tokio::process::Command::new("adb");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DaemonError::tool_missing("adb")
            } else {
                DaemonError::command_failed(format!("failed to start log stream: {e}"))
            }
        })
    }
}

/// Parse `adb devices -l` output into descriptors.
fn parse_adb_devices(raw: &str) -> Vec<DeviceDescriptor> {
    raw.lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            if state != "device" && state != "offline" {
                return None;
            }
            let rest: Vec<&str> = parts.collect();
            let model = rest
                .iter()
                .find_map(|p| p.strip_prefix("model:"))
                .unwrap_or(serial)
                .replace('_', " ");
            let kind = if serial.starts_with("emulator-") {
                DeviceKind::Emulator
            } else {
                DeviceKind::Device
            };
            let target = if model.to_ascii_lowercase().contains("tv") {
                TargetClass::Tv
            } else {
                TargetClass::Mobile
            };
            Some(DeviceDescriptor {
                platform: Platform::Android,
                id: serial.to_string(),
                name: model,
                kind,
                target,
                booted: state == "device",
                sim_set: None,
            })
        })
        .collect()
}

fn parse_coords(target: &str) -> Option<(i64, i64)> {
    let (x, y) = target.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn swipe_vector(args: &[String]) -> Option<((i64, i64), (i64, i64))> {
    match args.first().map(String::as_str) {
        Some("up") => Some(((500, 1400), (500, 600))),
        Some("down") => Some(((500, 600), (500, 1400))),
        Some("left") => Some(((900, 1000), (200, 1000))),
        Some("right") => Some(((200, 1000), (900, 1000))),
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

/// `input text` treats spaces specially; %s is its escape for a space.
fn encode_input_text(text: &str) -> String {
    text.replace(' ', "%s")
}

/// Android keyboard command keys to keyevent codes.
fn keyevent_code(key: &str) -> Option<&'static str> {
    match key.to_ascii_lowercase().as_str() {
        "enter" => Some("66"),
        "tab" => Some("61"),
        "escape" => Some("111"),
        "delete" | "backspace" => Some("67"),
        "up" => Some("19"),
        "down" => Some("20"),
        "left" => Some("21"),
        "right" => Some("22"),
        "volume-up" => Some("24"),
        "volume-down" => Some("25"),
        "power" => Some("26"),
        "menu" => Some("82"),
        _ => None,
    }
}

/// Matching nodes from a uiautomator XML dump.
///
/// The dump is a single line of nested `<node .../>` elements; we match
/// on the text, resource-id, and content-desc attributes without a full
/// XML parse.
fn find_nodes(dump: &str, query: &str) -> Vec<Value> {
    let needle = query.to_ascii_lowercase();
    let mut matches = Vec::new();
    for node in dump.split("<node ").skip(1) {
        let node = node.split('>').next().unwrap_or(node);
        let text = attr(node, "text");
        let resource_id = attr(node, "resource-id");
        let content_desc = attr(node, "content-desc");
        let hit = [&text, &resource_id, &content_desc]
            .iter()
            .any(|v| v.to_ascii_lowercase().contains(&needle));
        if hit {
            matches.push(json!({
                "text": text,
                "resourceId": resource_id,
                "contentDesc": content_desc,
                "bounds": attr(node, "bounds"),
            }));
        }
    }
    matches
}

/// Center of the first matching node's `bounds="[x1,y1][x2,y2]"`.
fn find_node_center(dump: &str, query: &str) -> Option<(i64, i64)> {
    let nodes = find_nodes(dump, query);
    let bounds = nodes.first()?.get("bounds")?.as_str()?.to_string();
    parse_bounds(&bounds)
}

fn attr(node: &str, name: &str) -> String {
    let marker = format!("{name}=\"");
    let Some(start) = node.find(&marker) else {
        return String::new();
    };
    let rest = &node[start + marker.len()..];
    rest.split('"').next().unwrap_or("").to_string()
}

fn parse_bounds(bounds: &str) -> Option<(i64, i64)> {
    let inner = bounds.strip_prefix('[')?;
    let (first, second) = inner.split_once("][")?;
    let second = second.strip_suffix(']')?;
    let (x1, y1) = first.split_once(',')?;
    let (x2, y2) = second.split_once(',')?;
    let (x1, y1): (i64, i64) = (x1.trim().parse().ok()?, y1.trim().parse().ok()?);
    let (x2, y2): (i64, i64) = (x2.trim().parse().ok()?, y2.trim().parse().ok()?);
    Some(((x1 + x2) / 2, (y1 + y2) / 2))
}

#[cfg(test)]
#[path = "android_tests.rs"]
mod tests;
