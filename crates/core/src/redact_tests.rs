// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[yare::parameterized(
    token = { "token" },
    upper = { "TOKEN" },
    auth = { "Authorization" },
    password = { "password" },
    api_key = { "apiKey" },
    snake_api_key = { "api_key" },
    secret = { "secret" },
    access = { "accessToken" },
    suffixed = { "daemonToken" },
    client_secret = { "clientSecret" },
)]
fn secret_keys_detected(key: &str) {
    assert!(is_secret_key(key), "{key} should be secret");
}

#[yare::parameterized(
    session = { "session" },
    command = { "command" },
    udid = { "udid" },
    tokenize = { "tokenizer" },
)]
fn plain_keys_pass(key: &str) {
    assert!(!is_secret_key(key), "{key} should not be secret");
}

#[test]
fn redacts_nested_structures() {
    let mut value = json!({
        "command": "open",
        "token": "abc",
        "env": [{"apiKey": "k", "name": "x"}],
        "meta": {"password": "p", "requestId": "r1"},
    });
    redact_value(&mut value);
    assert_eq!(value["token"], REDACTED);
    assert_eq!(value["env"][0]["apiKey"], REDACTED);
    assert_eq!(value["env"][0]["name"], "x");
    assert_eq!(value["meta"]["password"], REDACTED);
    assert_eq!(value["meta"]["requestId"], "r1");
}

#[test]
fn null_secret_values_stay_null() {
    let mut value = json!({"token": null});
    redact_value(&mut value);
    assert!(value["token"].is_null());
}
