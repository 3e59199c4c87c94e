// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Element queries: `find`, `is`, `get`.
//!
//! The heavy lifting (snapshotting the UI and matching) happens in the
//! backend; this group exists so queries demux ahead of interactions.

use serde_json::Value;

use ad_core::{DaemonError, Request};

use super::{dispatch_for_session, HandlerCtx};

pub async fn handle(ctx: &HandlerCtx<'_>, req: &Request) -> Option<Result<Value, DaemonError>> {
    match req.command.as_str() {
        "find" | "is" | "get" => Some(dispatch_for_session(ctx, req).await),
        _ => None,
    }
}
