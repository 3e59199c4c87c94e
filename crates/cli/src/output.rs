// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Response rendering: pretty JSON or a terse human line.

use ad_core::Response;

pub fn print_response(response: &Response, json: bool) {
    if json {
        match serde_json::to_string_pretty(response) {
            Ok(rendered) => println!("{rendered}"),
            Err(_) => println!("{{\"ok\": false}}"),
        }
        return;
    }

    if response.ok {
        match &response.data {
            Some(data) => match serde_json::to_string_pretty(data) {
                Ok(rendered) => println!("{rendered}"),
                Err(_) => println!("ok"),
            },
            None => println!("ok"),
        }
    } else if let Some(error) = &response.error {
        eprintln!("error[{}]: {}", error.code, error.message);
        if let Some(hint) = &error.hint {
            eprintln!("  hint: {hint}");
        }
        if let Some(log_path) = &error.log_path {
            eprintln!("  log: {}", log_path.display());
        }
    }
}
