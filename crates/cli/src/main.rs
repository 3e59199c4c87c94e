// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! agent-device CLI (ad)
//!
//! Thin client over the daemon: locate or launch it, send one command,
//! print the result. All command semantics live daemon-side.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod daemon_process;
mod env;
mod output;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;

use ad_core::{Flags, Request};

use crate::client::DaemonClient;

#[derive(Parser)]
#[command(
    name = "ad",
    version,
    about = "Drive iOS and Android devices through the agent-device daemon",
    disable_help_subcommand = true
)]
struct Cli {
    /// Session name
    #[arg(long, global = true, default_value = "default")]
    session: String,

    /// Print the raw response envelope as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Include debug diagnostics in the response
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage the daemon process
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Any device command: `ad open Settings --platform ios`
    #[command(external_subcommand)]
    Device(Vec<String>),
}

#[derive(clap::Subcommand)]
enum DaemonAction {
    /// Start the daemon if it is not running
    Start,
    /// Stop a running daemon
    Stop,
    /// Show daemon status from its metadata
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon { action } => daemon_command(action).await,
        Commands::Device(raw) => {
            let (command, args, mut flags) = parse_device_command(&raw)?;
            // Global flags also work after the command
            let session = flags
                .remove("session")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or(cli.session.clone());
            let json = cli.json || flags.remove("json").is_some();
            let mut request = Request::new(command).with_session(session).with_args(args);
            request.flags = flags;
            request.meta.debug = cli.debug;
            request.meta.cwd = std::env::current_dir().ok();
            request.meta.request_id = Some(uuid::Uuid::new_v4().simple().to_string());

            let client = DaemonClient::ensure()
                .await
                .context("could not reach the daemon")?;
            let response = client.submit(request).await?;
            output::print_response(&response, json);
            if !response.ok {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

async fn daemon_command(action: DaemonAction) -> anyhow::Result<()> {
    let state_dir = daemon_process::state_dir()?;
    match action {
        DaemonAction::Start => {
            let client = DaemonClient::ensure().await?;
            println!("daemon running (pid {})", client.meta.pid);
            Ok(())
        }
        DaemonAction::Stop => {
            daemon_process::stop_daemon_sync(&state_dir);
            println!("daemon stopped");
            Ok(())
        }
        DaemonAction::Status => {
            match ad_daemon::metadata::read_metadata(&state_dir) {
                Some(meta) if daemon_process::metadata_is_live(&meta) => {
                    println!("running");
                    println!("  pid: {}", meta.pid);
                    println!("  version: {}", meta.version);
                    if let Some(port) = meta.port {
                        println!("  port: {port}");
                    }
                    if let Some(port) = meta.http_port {
                        println!("  httpPort: {port}");
                    }
                    println!("  stateDir: {}", meta.state_dir.display());
                }
                _ => println!("not running"),
            }
            Ok(())
        }
    }
}

/// Split a raw device invocation into command, positionals, and flags.
///
/// `--flag value` pairs become typed flags; a `--flag` followed by
/// another flag (or nothing) is boolean true.
fn parse_device_command(raw: &[String]) -> anyhow::Result<(String, Vec<String>, Flags)> {
    let mut iter = raw.iter().peekable();
    let Some(command) = iter.next() else {
        bail!("missing command");
    };

    let mut args = Vec::new();
    let mut flags = Flags::new();
    while let Some(token) = iter.next() {
        if let Some(name) = token.strip_prefix("--") {
            if name.is_empty() {
                bail!("empty flag name");
            }
            let takes_value = iter.peek().is_some_and(|next| !next.starts_with("--"));
            if takes_value {
                let value = iter.next().map(String::as_str).unwrap_or_default();
                flags.insert(name, parse_flag_value(value));
            } else {
                flags.insert(name, Value::Bool(true));
            }
        } else {
            args.push(token.clone());
        }
    }

    Ok((command.clone(), args, flags))
}

fn parse_flag_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match raw.parse::<i64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => match serde_json::from_str::<Value>(raw) {
                // Inline JSON for structured flags like batch --steps
                Ok(value @ (Value::Array(_) | Value::Object(_))) => value,
                _ => Value::String(raw.to_string()),
            },
        },
    }
}
