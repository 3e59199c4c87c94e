// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

pub(crate) fn sim(name: &str, udid: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        platform: Platform::Ios,
        id: udid.to_string(),
        name: name.to_string(),
        kind: DeviceKind::Simulator,
        target: TargetClass::Mobile,
        booted: true,
        sim_set: None,
    }
}

fn android(name: &str, serial: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        platform: Platform::Android,
        id: serial.to_string(),
        name: name.to_string(),
        kind: DeviceKind::Emulator,
        target: TargetClass::Mobile,
        booted: true,
        sim_set: None,
    }
}

#[yare::parameterized(
    ios = { "ios", Some(Platform::Ios) },
    apple_alias = { "apple", Some(Platform::Ios) },
    upper = { "IOS", Some(Platform::Ios) },
    android = { "android", Some(Platform::Android) },
    junk = { "windows", None },
)]
fn platform_parse(input: &str, expected: Option<Platform>) {
    assert_eq!(Platform::parse(input), expected);
}

#[test]
fn selector_from_flags_reads_everything() {
    let mut flags = Flags::new();
    flags.insert("platform", json!("apple"));
    flags.insert("target", json!("tv"));
    flags.insert("device", json!("Apple TV 4K"));
    flags.insert("udid", json!("UDID-1"));
    flags.insert("simulatorSet", json!("/tmp/sims"));
    flags.insert("serialAllowlist", json!("a, b,c"));

    let selector = Selector::from_flags(&flags).unwrap();
    assert_eq!(selector.platform, Some(Platform::Ios));
    assert_eq!(selector.target, Some(TargetClass::Tv));
    assert_eq!(selector.device_name.as_deref(), Some("Apple TV 4K"));
    assert_eq!(selector.udid.as_deref(), Some("UDID-1"));
    assert_eq!(
        selector.serial_allowlist,
        Some(vec!["a".into(), "b".into(), "c".into()])
    );
}

#[test]
fn selector_rejects_unknown_platform() {
    let mut flags = Flags::new();
    flags.insert("platform", json!("webos"));
    let err = Selector::from_flags(&flags).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgs);
}

use crate::error::ErrorCode;

#[test]
fn empty_selector_matches_anything() {
    let selector = Selector::default();
    assert!(selector.is_empty());
    assert!(selector.matches(&sim("iPhone 16", "U1")));
    assert!(selector.matches(&android("Pixel 7", "emulator-5554")));
}

#[test]
fn device_name_matches_case_insensitively() {
    let selector = Selector {
        device_name: Some("iphone 16".into()),
        ..Default::default()
    };
    assert!(selector.matches(&sim("iPhone 16", "U1")));
}

#[test]
fn conflicts_enumerate_offending_flags() {
    let selector = Selector {
        platform: Some(Platform::Android),
        device_name: Some("Pixel 8".into()),
        udid: Some("OTHER".into()),
        ..Default::default()
    };
    let conflicts = selector.conflicts_with(&sim("iPhone 16", "U1"));
    assert_eq!(conflicts, vec!["platform", "device", "udid"]);
}

#[test]
fn allowlist_restricts_serials() {
    let selector = Selector {
        serial_allowlist: Some(vec!["emulator-5554".into()]),
        ..Default::default()
    };
    assert!(selector.matches(&android("Pixel 7", "emulator-5554")));
    assert!(!selector.matches(&android("Pixel 7", "emulator-5556")));
}

#[test]
fn simulator_set_must_match() {
    let selector = Selector {
        simulator_set: Some("/tmp/sims".into()),
        ..Default::default()
    };
    let mut device = sim("iPhone 16", "U1");
    assert!(!selector.matches(&device));
    device.sim_set = Some("/tmp/sims".into());
    assert!(selector.matches(&device));
}

#[test]
fn descriptor_serializes_camel_case() {
    let mut device = sim("iPhone 16", "U1");
    device.sim_set = Some("/tmp/sims".into());
    let value = serde_json::to_value(&device).unwrap();
    assert_eq!(value["platform"], "ios");
    assert_eq!(value["kind"], "simulator");
    assert_eq!(value["simSet"], "/tmp/sims");
}
