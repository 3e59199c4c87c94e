// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ad-core: Domain types for the agent-device control plane.
//!
//! Pure data: envelopes, devices, sessions, leases, the capability
//! matrix, and the replay-script codec. No I/O lives here.

pub mod cancel;
pub mod capability;
pub mod clock;
pub mod device;
pub mod envelope;
pub mod error;
pub mod lease;
pub mod redact;
pub mod script;
pub mod session;

pub use cancel::CancelFlag;
pub use capability::command_supported;
pub use clock::{Clock, SystemClock};
pub use device::{DeviceDescriptor, DeviceKind, Platform, Selector, TargetClass};
pub use envelope::{Flags, Meta, Request, Response, SessionIsolation};
pub use error::{DaemonError, ErrorCode};
pub use lease::{valid_lease_id, valid_scope_id, Lease, BACKEND_IOS_SIMULATOR};
pub use redact::{redact_value, REDACTED};
pub use script::{encode_action, parse_line, ParsedLine};
pub use session::{
    ActionRecord, AppContext, AppLogHandle, LogStreamState, RecordingHandle, RecordingKind,
    Session, JOURNAL_CAP, STARTUP_SAMPLES_CAP,
};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
