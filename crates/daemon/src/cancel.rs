// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of in-flight requests and their cancellation flags.

use std::collections::HashMap;

use parking_lot::Mutex;

use ad_core::CancelFlag;

/// Maps request ids to cancellation flags for as long as the request is
/// in flight. Transports mark flags on disconnect; the pipeline
/// registers on entry and removes on exit.
#[derive(Default)]
pub struct CancelRegistry {
    inner: Mutex<HashMap<String, CancelFlag>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request; returns the flag handlers should poll.
    pub fn register(&self, request_id: &str) -> CancelFlag {
        let flag = CancelFlag::new();
        self.inner
            .lock()
            .insert(request_id.to_string(), flag.clone());
        flag
    }

    /// Mark one request canceled, if still in flight.
    pub fn cancel(&self, request_id: &str) {
        if let Some(flag) = self.inner.lock().get(request_id) {
            flag.cancel();
        }
    }

    /// The request finished; drop its flag.
    pub fn finish(&self, request_id: &str) {
        self.inner.lock().remove(request_id);
    }

    /// Whether a request is still in flight.
    pub fn is_active(&self, request_id: &str) -> bool {
        self.inner.lock().contains_key(request_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().len()
    }
}
