// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn record(command: &str, args: &[&str], flags: &[(&str, Value)]) -> ActionRecord {
    let mut map = Flags::new();
    for (key, value) in flags {
        map.insert(*key, value.clone());
    }
    ActionRecord {
        command: command.into(),
        args: args.iter().map(|s| s.to_string()).collect(),
        flags: map,
        ok: true,
        at_ms: 0,
    }
}

#[test]
fn encodes_plain_action() {
    let action = record("press", &["Login"], &[]);
    assert_eq!(encode_action(&action), "press Login");
}

#[test]
fn encodes_quoted_positional() {
    let action = record("open", &["App Store"], &[]);
    assert_eq!(encode_action(&action), "open \"App Store\"");
}

#[test]
fn encodes_flags_in_stable_order() {
    let action = record(
        "fill",
        &["username", "alice"],
        &[("device", json!("iPhone 16")), ("platform", json!("ios"))],
    );
    // BTreeMap iteration keeps flag order deterministic
    assert_eq!(
        encode_action(&action),
        "fill username alice --device \"iPhone 16\" --platform ios"
    );
}

#[test]
fn boolean_flags_encode_bare() {
    let action = record("close", &[], &[("saveScript", json!(true)), ("debug", json!(false))]);
    assert_eq!(encode_action(&action), "close --saveScript");
}

#[test]
fn parses_blank_and_comment_lines_to_none() {
    assert_eq!(parse_line("").unwrap(), None);
    assert_eq!(parse_line("   ").unwrap(), None);
    assert_eq!(parse_line("# boot the sim").unwrap(), None);
}

#[test]
fn parses_flags_and_positionals() {
    let parsed = parse_line("fill username alice --platform ios --ttlMs 500")
        .unwrap()
        .unwrap();
    assert_eq!(parsed.command, "fill");
    assert_eq!(parsed.args, vec!["username", "alice"]);
    assert_eq!(parsed.flags.get_str("platform"), Some("ios"));
    assert_eq!(parsed.flags.get_u64("ttlMs"), Some(500));
}

#[test]
fn parses_bare_flag_as_true() {
    let parsed = parse_line("close --saveScript").unwrap().unwrap();
    assert_eq!(parsed.flags.get("saveScript"), Some(&json!(true)));
}

#[test]
fn quoted_value_starting_with_dashes_is_a_value() {
    let parsed = parse_line("type \"--literal\"").unwrap().unwrap();
    assert_eq!(parsed.args, vec!["--literal"]);
}

#[test]
fn unterminated_quote_is_an_error() {
    assert!(parse_line("open \"App Store").is_err());
}

#[test]
fn round_trips_a_journal() {
    let actions = vec![
        record("open", &["Settings"], &[("platform", json!("ios"))]),
        record("fill", &["user name", "a\"b"], &[]),
        record("press", &["Sign In"], &[("timeoutMs", json!(2000))]),
        record("close", &[], &[("saveScript", json!(true))]),
    ];

    for action in &actions {
        let line = encode_action(action);
        let parsed = parse_line(&line).unwrap().unwrap();
        assert_eq!(parsed.command, action.command, "line: {line}");
        assert_eq!(parsed.args, action.args, "line: {line}");
        assert_eq!(parsed.flags, action.flags, "line: {line}");
    }
}
