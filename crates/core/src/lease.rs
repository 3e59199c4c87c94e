// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease records for tenant-scoped backend admission.

use serde::{Deserialize, Serialize};

/// The only backend leases are minted for today.
pub const BACKEND_IOS_SIMULATOR: &str = "ios-simulator";

/// Tenant and run identifiers: `[A-Za-z0-9._-]{1,128}`.
pub fn valid_scope_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 128
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Lease ids are 16-128 hex characters.
pub fn valid_lease_id(s: &str) -> bool {
    (16..=128).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// A time-bounded admission token for one `(tenant, run, backend)` binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub lease_id: String,
    pub tenant_id: String,
    pub run_id: String,
    pub backend: String,
    pub created_at: u64,
    pub heartbeat_at: u64,
    pub expires_at: u64,
}

impl Lease {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    /// Key for the secondary idempotence index.
    pub fn scope_key(&self) -> (String, String, String) {
        (
            self.tenant_id.clone(),
            self.run_id.clone(),
            self.backend.clone(),
        )
    }
}
