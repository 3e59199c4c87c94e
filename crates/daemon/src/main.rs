// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! agent-device daemon (add)
//!
//! Background process that owns device sessions and serves the request
//! pipeline over a loopback socket and/or HTTP.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::io::Write;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use ad_backends::{AndroidBackend, DeviceBackend, IosBackend};
use ad_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use ad_daemon::server::{http, socket::SocketServer};
use ad_daemon::{env, VERSION};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("add {VERSION}");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("add {VERSION}");
                println!("agent-device daemon - owns device sessions and serves the request pipeline");
                println!();
                println!("USAGE:");
                println!("    add");
                println!();
                println!("The daemon is typically started by the `ad` CLI and should not");
                println!("be invoked directly. It listens on loopback for commands.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: add [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Fresh daemon log for each run, marker first so the client can
    // scope startup errors. A live lock holder keeps its log: we are
    // about to yield to it.
    let lock_holder_alive = ad_daemon::metadata::read_lock(&config.state_dir)
        .map(|info| {
            ad_backends::process::is_live_daemon_process(
                info.pid,
                ad_daemon::lifecycle::DAEMON_ENTRY_HINT,
                info.start_time.as_deref(),
            )
        })
        .unwrap_or(false);
    if !lock_holder_alive {
        truncate_log_with_marker(&config);
    }

    let log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: cannot set up logging: {e}");
            std::process::exit(1);
        }
    };

    info!(version = VERSION, "starting daemon");

    let backends: Vec<Arc<dyn DeviceBackend>> = vec![
        Arc::new(IosBackend::new()),
        Arc::new(AndroidBackend::new()),
    ];
    let mode = env::server_mode();

    let StartupResult {
        state,
        socket,
        http: http_listener,
    } = match lifecycle::startup(&config, backends, mode).await {
        Ok(result) => result,
        Err(LifecycleError::LockHeld { pid }) => {
            // Another daemon owns the lock; yield cleanly.
            eprintln!("add is already running (pid {pid})");
            return Ok(());
        }
        Err(e) => {
            write_startup_error(&config, &e);
            error!("failed to start daemon: {e}");
            drop(log_guard);
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    // Port hints for a foreground launcher
    if let Some(listener) = &socket {
        if let Ok(addr) = listener.local_addr() {
            println!("AGENT_DEVICE_DAEMON_PORT={}", addr.port());
        }
    }
    if let Some(listener) = &http_listener {
        if let Ok(addr) = listener.local_addr() {
            println!("AGENT_DEVICE_DAEMON_HTTP_PORT={}", addr.port());
        }
    }
    let _ = std::io::stdout().flush();

    if let Some(listener) = socket {
        let server = SocketServer::new(listener, Arc::clone(&state));
        tokio::spawn(server.run());
    }
    if let Some(listener) = http_listener {
        tokio::spawn(http::serve(listener, Arc::clone(&state)));
    }

    // Sweep strays from a previous instance once servers are up
    lifecycle::startup_sweep(&state).await;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    info!("daemon ready");

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("received SIGINT, shutting down..."),
        _ = sighup.recv() => info!("received SIGHUP, shutting down..."),
    }

    lifecycle::shutdown(&state).await;
    info!("daemon stopped");
    Ok(())
}

/// Startup marker prefix written to the log before anything else.
/// The CLI uses it to find where the current startup attempt begins.
const STARTUP_MARKER_PREFIX: &str = "--- add: starting (pid: ";

fn truncate_log_with_marker(config: &Config) {
    if let Some(parent) = config.log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let marker = format!("{}{}) ---\n\n", STARTUP_MARKER_PREFIX, std::process::id());
    let _ = std::fs::write(&config.log_path, marker);
}

/// Write a startup error synchronously so it is visible to the CLI
/// even if the process exits before tracing flushes.
fn write_startup_error(config: &Config, error: &LifecycleError) {
    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {error}");
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = config
        .log_path
        .parent()
        .ok_or(LifecycleError::NoStateDir)?;
    let name = config
        .log_path
        .file_name()
        .ok_or(LifecycleError::NoStateDir)?;
    let file_appender = tracing_appender::rolling::never(dir, name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
