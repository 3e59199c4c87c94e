// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device descriptors and the selector used to pick one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::envelope::Flags;
use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// Parse a platform name, honoring the `apple` alias.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ios" | "apple" => Some(Platform::Ios),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Simulator,
    Emulator,
    Device,
}

impl DeviceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Simulator => "simulator",
            DeviceKind::Emulator => "emulator",
            DeviceKind::Device => "device",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetClass {
    Mobile,
    Tv,
}

impl TargetClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Some(TargetClass::Mobile),
            "tv" => Some(TargetClass::Tv),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetClass::Mobile => "mobile",
            TargetClass::Tv => "tv",
        }
    }
}

/// A discovered device, immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub platform: Platform,
    /// UDID for iOS, serial for Android.
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub target: TargetClass,
    pub booted: bool,
    /// Simulator-set path for iOS simulators outside the default set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_set: Option<PathBuf>,
}

impl DeviceDescriptor {
    /// Short human description used in error messages.
    pub fn describe(&self) -> String {
        format!("{} {} ({})", self.platform.as_str(), self.kind.as_str(), self.name)
    }
}

/// The combined device selector taken from request flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    pub platform: Option<Platform>,
    pub target: Option<TargetClass>,
    pub device_name: Option<String>,
    pub udid: Option<String>,
    pub serial: Option<String>,
    pub simulator_set: Option<PathBuf>,
    pub serial_allowlist: Option<Vec<String>>,
}

impl Selector {
    /// Extract the selector from request flags.
    ///
    /// Unknown values for `platform` and `target` fail here; everything
    /// else is passed through for the compatibility check to judge.
    pub fn from_flags(flags: &Flags) -> Result<Self, DaemonError> {
        let platform = match flags.get_str("platform") {
            Some(s) => Some(Platform::parse(s).ok_or_else(|| {
                DaemonError::invalid_args(format!("unknown platform '{s}'"))
                    .with_hint("Use 'ios' (alias 'apple') or 'android'.")
            })?),
            None => None,
        };
        let target = match flags.get_str("target") {
            Some(s) => Some(TargetClass::parse(s).ok_or_else(|| {
                DaemonError::invalid_args(format!("unknown target '{s}'"))
                    .with_hint("Use 'mobile' or 'tv'.")
            })?),
            None => None,
        };

        let serial_allowlist = match flags.get("serialAllowlist") {
            Some(serde_json::Value::String(s)) => Some(
                s.split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect(),
            ),
            Some(serde_json::Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => None,
        };

        Ok(Self {
            platform,
            target,
            device_name: flags.get_str("device").map(String::from),
            udid: flags.get_str("udid").map(String::from),
            serial: flags.get_str("serial").map(String::from),
            simulator_set: flags.get_path("simulatorSet"),
            serial_allowlist,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.platform.is_none()
            && self.target.is_none()
            && self.device_name.is_none()
            && self.udid.is_none()
            && self.serial.is_none()
            && self.simulator_set.is_none()
            && self.serial_allowlist.is_none()
    }

    /// Flags whose values conflict with the given device, by flag name.
    pub fn conflicts_with(&self, device: &DeviceDescriptor) -> Vec<&'static str> {
        let mut conflicts = Vec::new();

        if self.platform.is_some_and(|p| p != device.platform) {
            conflicts.push("platform");
        }
        if self.target.is_some_and(|t| t != device.target) {
            conflicts.push("target");
        }
        if self
            .device_name
            .as_deref()
            .is_some_and(|name| !name.eq_ignore_ascii_case(&device.name))
        {
            conflicts.push("device");
        }
        if self.udid.as_deref().is_some_and(|udid| udid != device.id) {
            conflicts.push("udid");
        }
        if self.serial.as_deref().is_some_and(|serial| serial != device.id) {
            conflicts.push("serial");
        }
        if self
            .simulator_set
            .as_deref()
            .is_some_and(|set| device.sim_set.as_deref() != Some(set))
        {
            conflicts.push("simulatorSet");
        }
        if self
            .serial_allowlist
            .as_ref()
            .is_some_and(|list| !list.iter().any(|serial| serial == &device.id))
        {
            conflicts.push("serialAllowlist");
        }

        conflicts
    }

    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        self.conflicts_with(device).is_empty()
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
