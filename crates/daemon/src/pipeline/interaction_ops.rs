// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interaction commands: gestures, text entry, hardware keys, waits.

use serde_json::Value;

use ad_core::{DaemonError, Request};

use super::{dispatch_for_session, HandlerCtx};

pub async fn handle(ctx: &HandlerCtx<'_>, req: &Request) -> Option<Result<Value, DaemonError>> {
    match req.command.as_str() {
        "press" | "longpress" | "swipe" | "scroll" | "scrollintoview" | "focus" | "type"
        | "fill" | "pinch" | "back" | "home" | "app-switcher" | "wait" | "alert" | "settings"
        | "keyboard" => Some(dispatch_for_session(ctx, req).await),
        _ => None,
    }
}
