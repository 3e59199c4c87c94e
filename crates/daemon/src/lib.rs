// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! agent-device daemon library.
//!
//! The daemon owns device sessions, mediates concurrent client requests,
//! enforces tenant isolation via leases, supervises external processes,
//! and serves the request pipeline over a loopback socket and HTTP.

pub mod cancel;
pub mod diagnostics;
pub mod dispatch;
pub mod env;
pub mod leases;
pub mod lifecycle;
pub mod metadata;
pub mod pipeline;
pub mod runners;
pub mod server;
pub mod sessions;

use std::fs::File;
use std::sync::Arc;
use std::time::Instant;

use ad_core::{Clock, SystemClock};

use crate::cancel::CancelRegistry;
use crate::dispatch::Dispatcher;
use crate::leases::{LeaseConfig, LeaseRegistry};
use crate::lifecycle::Config;
use crate::runners::RunnerRegistry;
use crate::sessions::SessionStore;

pub use metadata::DaemonMetadata;

/// Version string baked into metadata and the lock file.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolved HTTP auth hook: executable plus decision export.
#[derive(Debug, Clone)]
pub struct AuthHookConfig {
    pub path: std::path::PathBuf,
    pub export: String,
}

impl AuthHookConfig {
    fn from_env() -> Option<Self> {
        env::http_auth_hook().map(|path| Self {
            path,
            export: env::http_auth_export(),
        })
    }
}

/// Shared daemon state handed to every request handler.
pub struct DaemonState {
    pub config: Config,
    /// Per-invocation secret; every request must present it.
    pub token: String,
    pub sessions: SessionStore,
    pub leases: LeaseRegistry,
    pub cancels: CancelRegistry,
    pub runners: RunnerRegistry,
    pub dispatcher: Dispatcher,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
    /// Resolved once at startup; consulted per HTTP request.
    pub auth_hook: Option<AuthHookConfig>,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: Option<File>,
}

impl DaemonState {
    pub fn new(
        config: Config,
        backends: Vec<Arc<dyn ad_backends::DeviceBackend>>,
        lock_file: Option<File>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let token = uuid::Uuid::new_v4().simple().to_string();
        let sessions = SessionStore::new(config.state_dir.clone(), Arc::clone(&clock));
        let leases = LeaseRegistry::new(LeaseConfig::from_env(), Arc::clone(&clock));
        let dispatcher = Dispatcher::new(backends, config.log_path.clone());
        Self {
            config,
            token,
            sessions,
            leases,
            cancels: CancelRegistry::new(),
            runners: RunnerRegistry::new(),
            dispatcher,
            clock,
            start_time: Instant::now(),
            auth_hook: AuthHookConfig::from_env(),
            lock_file,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
