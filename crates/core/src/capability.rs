// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability matrix: which commands run on which device classes.
//!
//! tvOS targets follow the iOS rules for their kind; Android TV follows
//! the Android rules. Commands not listed here are treated as supported
//! so newer clients keep working against an older matrix.

use crate::device::{DeviceKind, Platform};

/// Whether `command` is available on the given device class.
pub fn command_supported(command: &str, platform: Platform, kind: DeviceKind) -> bool {
    let ios_simulator = platform == Platform::Ios && kind == DeviceKind::Simulator;
    let ios_device = platform == Platform::Ios && kind == DeviceKind::Device;
    let android = platform == Platform::Android;

    match command {
        "alert" | "pinch" => ios_simulator,
        "settings" | "push" | "clipboard" => ios_simulator || android,
        "keyboard" => android,
        "open" | "close" | "snapshot" | "wait" | "press" | "fill" | "type" | "focus"
        | "scroll" | "scrollintoview" | "back" | "home" | "app-switcher" | "screenshot"
        | "record" | "reinstall" | "logs" | "apps" | "appstate" | "boot"
        | "trigger-app-event" | "find" | "is" | "get" | "longpress" | "diff" | "perf"
        | "swipe" | "network" | "replay" | "batch" => ios_simulator || ios_device || android,
        _ => true,
    }
}
