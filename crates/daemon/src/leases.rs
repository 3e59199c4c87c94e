// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory lease registry for tenant-scoped backend admission.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use ad_core::{valid_scope_id, Clock, DaemonError, Lease, BACKEND_IOS_SIMULATOR};

/// TTL bounds and capacity for the registry.
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub default_ttl_ms: u64,
    pub min_ttl_ms: u64,
    pub max_ttl_ms: u64,
    /// Per-backend cap; `None` means unbounded.
    pub capacity: Option<usize>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60_000,
            min_ttl_ms: 5_000,
            max_ttl_ms: 600_000,
            capacity: None,
        }
    }
}

impl LeaseConfig {
    pub fn from_env() -> Self {
        Self {
            default_ttl_ms: crate::env::lease_ttl_ms(),
            min_ttl_ms: crate::env::lease_min_ttl_ms(),
            max_ttl_ms: crate::env::lease_max_ttl_ms(),
            capacity: crate::env::max_simulator_leases(),
        }
    }
}

#[derive(Default)]
struct LeaseState {
    leases: HashMap<String, Lease>,
    /// `(tenant, run, backend)` to current lease id; guarantees
    /// allocation idempotence per run.
    by_scope: HashMap<(String, String, String), String>,
}

/// All operations are O(1) and short; one mutex serializes them.
pub struct LeaseRegistry {
    config: LeaseConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<LeaseState>,
}

impl LeaseRegistry {
    pub fn new(config: LeaseConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(LeaseState::default()),
        }
    }

    pub fn allocate(
        &self,
        tenant_id: &str,
        run_id: &str,
        backend: Option<&str>,
        ttl_ms: Option<u64>,
    ) -> Result<Lease, DaemonError> {
        let backend = backend.unwrap_or(BACKEND_IOS_SIMULATOR);
        if !valid_scope_id(tenant_id) {
            return Err(DaemonError::invalid_args(format!(
                "invalid tenantId '{tenant_id}'"
            ))
            .with_hint("Tenant ids are 1-128 characters of [A-Za-z0-9._-]."));
        }
        if !valid_scope_id(run_id) {
            return Err(DaemonError::invalid_args(format!("invalid runId '{run_id}'"))
                .with_hint("Run ids are 1-128 characters of [A-Za-z0-9._-]."));
        }

        let now = self.clock.now_ms();
        let ttl = self.clamp_ttl(ttl_ms);
        let mut state = self.state.lock();
        sweep(&mut state, now);

        let scope = (tenant_id.to_string(), run_id.to_string(), backend.to_string());
        if let Some(existing_id) = state.by_scope.get(&scope).cloned() {
            if let Some(lease) = state.leases.get_mut(&existing_id) {
                lease.heartbeat_at = now;
                lease.expires_at = now + ttl;
                return Ok(lease.clone());
            }
        }

        if let Some(cap) = self.config.capacity {
            let active = state
                .leases
                .values()
                .filter(|l| l.backend == backend)
                .count();
            if active >= cap {
                return Err(DaemonError::command_failed(format!(
                    "backend '{backend}' is at capacity ({cap} active leases)"
                ))
                .with_hint("Release a lease or raise AGENT_DEVICE_MAX_SIMULATOR_LEASES.")
                .with_details(json!({"backend": backend, "capacity": cap})));
            }
        }

        let lease = Lease {
            lease_id: uuid::Uuid::new_v4().simple().to_string(),
            tenant_id: tenant_id.to_string(),
            run_id: run_id.to_string(),
            backend: backend.to_string(),
            created_at: now,
            heartbeat_at: now,
            expires_at: now + ttl,
        };
        debug!(lease_id = %lease.lease_id, tenant = tenant_id, run = run_id, "lease allocated");
        state.by_scope.insert(scope, lease.lease_id.clone());
        state.leases.insert(lease.lease_id.clone(), lease.clone());
        Ok(lease)
    }

    pub fn heartbeat(
        &self,
        lease_id: &str,
        tenant_id: Option<&str>,
        run_id: Option<&str>,
        ttl_ms: Option<u64>,
    ) -> Result<Lease, DaemonError> {
        let now = self.clock.now_ms();
        let ttl = self.clamp_ttl(ttl_ms);
        let mut state = self.state.lock();
        sweep(&mut state, now);

        let lease = state
            .leases
            .get_mut(lease_id)
            .ok_or_else(not_found)?;
        check_scope(lease, tenant_id, run_id)?;
        lease.heartbeat_at = now;
        lease.expires_at = now + ttl;
        Ok(lease.clone())
    }

    /// Idempotent: releasing an unknown lease reports `released: false`.
    pub fn release(
        &self,
        lease_id: &str,
        tenant_id: Option<&str>,
        run_id: Option<&str>,
    ) -> Result<bool, DaemonError> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        sweep(&mut state, now);

        let Some(lease) = state.leases.get(lease_id) else {
            return Ok(false);
        };
        check_scope(lease, tenant_id, run_id)?;
        let scope = lease.scope_key();
        state.leases.remove(lease_id);
        state.by_scope.remove(&scope);
        debug!(lease_id, "lease released");
        Ok(true)
    }

    /// Admission gate for tenant-isolated commands other than lease ops.
    pub fn assert_admission(
        &self,
        tenant_id: &str,
        run_id: &str,
        lease_id: &str,
        backend: Option<&str>,
    ) -> Result<(), DaemonError> {
        let backend = backend.unwrap_or(BACKEND_IOS_SIMULATOR);
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        sweep(&mut state, now);

        let lease = state.leases.get(lease_id).ok_or_else(not_found)?;
        if lease.tenant_id != tenant_id || lease.run_id != run_id || lease.backend != backend {
            return Err(scope_mismatch());
        }
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        sweep(&mut state, now);
        state.leases.len()
    }

    fn clamp_ttl(&self, ttl_ms: Option<u64>) -> u64 {
        ttl_ms
            .unwrap_or(self.config.default_ttl_ms)
            .clamp(self.config.min_ttl_ms, self.config.max_ttl_ms)
    }
}

/// Expiry is lazy: swept whenever the registry is touched.
fn sweep(state: &mut LeaseState, now: u64) {
    let expired: Vec<String> = state
        .leases
        .values()
        .filter(|l| l.is_expired(now))
        .map(|l| l.lease_id.clone())
        .collect();
    for lease_id in expired {
        if let Some(lease) = state.leases.remove(&lease_id) {
            state.by_scope.remove(&lease.scope_key());
            debug!(lease_id = %lease.lease_id, "lease expired");
        }
    }
}

fn check_scope(
    lease: &Lease,
    tenant_id: Option<&str>,
    run_id: Option<&str>,
) -> Result<(), DaemonError> {
    if tenant_id.is_some_and(|t| t != lease.tenant_id)
        || run_id.is_some_and(|r| r != lease.run_id)
    {
        return Err(scope_mismatch());
    }
    Ok(())
}

fn not_found() -> DaemonError {
    DaemonError::unauthorized("LEASE_NOT_FOUND: no active lease with that id")
}

fn scope_mismatch() -> DaemonError {
    DaemonError::unauthorized("LEASE_SCOPE_MISMATCH: lease belongs to a different scope")
}

#[cfg(test)]
#[path = "leases_tests.rs"]
mod tests;
