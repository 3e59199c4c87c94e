// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replay-script codec.
//!
//! One line per journaled action: `<command> <positionals...> <flags...>`.
//! Tokens containing whitespace, quotes, or a leading `--` are wrapped in
//! double quotes with backslash escapes. Blank lines and `#` comments are
//! ignored when parsing.

use serde_json::Value;

use crate::envelope::Flags;
use crate::session::ActionRecord;

/// One parsed script line, ready to become a request.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub command: String,
    pub args: Vec<String>,
    pub flags: Flags,
}

/// Encode a journaled action as a single script line.
pub fn encode_action(action: &ActionRecord) -> String {
    let mut parts = vec![quote(&action.command)];
    for arg in &action.args {
        parts.push(quote(arg));
    }
    for (key, value) in action.flags.iter() {
        match value {
            Value::Bool(false) | Value::Null => {}
            Value::Bool(true) => parts.push(format!("--{key}")),
            Value::String(s) => {
                parts.push(format!("--{key}"));
                parts.push(quote(s));
            }
            Value::Number(n) => {
                parts.push(format!("--{key}"));
                parts.push(n.to_string());
            }
            other => {
                parts.push(format!("--{key}"));
                parts.push(quote(&other.to_string()));
            }
        }
    }
    parts.join(" ")
}

/// Parse one script line; `Ok(None)` for blanks and comments.
pub fn parse_line(line: &str) -> Result<Option<ParsedLine>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens = tokenize(trimmed)?;
    let mut iter = tokens.into_iter().peekable();
    let command = match iter.next() {
        Some(token) => token.text,
        None => return Ok(None),
    };

    let mut args = Vec::new();
    let mut flags = Flags::new();
    while let Some(token) = iter.next() {
        if !token.quoted && token.text.starts_with("--") {
            let key = token.text.trim_start_matches("--").to_string();
            if key.is_empty() {
                return Err("empty flag name".to_string());
            }
            let takes_value = iter
                .peek()
                .is_some_and(|next| next.quoted || !next.text.starts_with("--"));
            if takes_value {
                let raw = iter.next().map(|t| (t.text, t.quoted));
                let (text, quoted) = match raw {
                    Some(pair) => pair,
                    None => (String::new(), false),
                };
                flags.insert(key, parse_flag_value(&text, quoted));
            } else {
                flags.insert(key, Value::Bool(true));
            }
        } else {
            args.push(token.text);
        }
    }

    Ok(Some(ParsedLine { command, args, flags }))
}

fn parse_flag_value(text: &str, quoted: bool) -> Value {
    if quoted {
        return Value::String(text.to_string());
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match text.parse::<i64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => Value::String(text.to_string()),
        },
    }
}

fn quote(token: &str) -> String {
    let needs_quoting = token.is_empty()
        || token.starts_with("--")
        || token
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if !needs_quoting {
        return token.to_string();
    }
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for c in token.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some(escaped) => text.push(escaped),
                        None => return Err("dangling escape".to_string()),
                    },
                    other => text.push(other),
                }
            }
            if !closed {
                return Err("unterminated quote".to_string());
            }
            tokens.push(Token { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token {
                text,
                quoted: false,
            });
        }
    }

    Ok(tokens)
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
