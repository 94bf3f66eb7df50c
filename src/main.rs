//! # Vibra Link
//!
//! Keeps a session to a road-survey telemetry logger over an RFCOMM tty and
//! mirrors it on the terminal.
//!
//! State changes, snapshots and log entries are written to stdout as JSON
//! lines; every line typed on stdin is sent to the logger as a command.
//! Diagnostics go to stderr (or a daily log file when configured).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use vibra_link::config::{Config, LoggingConfig};
use vibra_link::telemetry::LogEntry;
use vibra_link::transport::{GrantedPermissions, SerialTransport};
use vibra_link::VibraLink;

/// File name prefix of the daily log files
const LOG_FILE_PREFIX: &str = "vibra-link.log";

/// One line of output
#[derive(Debug, Serialize)]
struct Event<'a, T: Serialize> {
    event: &'a str,
    at: DateTime<Utc>,
    data: &'a T,
}

fn event_line<T: Serialize>(event: &str, data: &T) -> serde_json::Result<String> {
    serde_json::to_string(&Event {
        event,
        at: Utc::now(),
        data,
    })
}

fn emit<T: Serialize>(event: &str, data: &T) {
    match event_line(event, data) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!("Failed to serialise {} event: {}", event, e),
    }
}

/// Entries pushed after `last_seq`, oldest first
///
/// `entries` is newest first, as published by the engine.
fn unseen(entries: &[LogEntry], last_seq: Option<u64>) -> Vec<&LogEntry> {
    let mut fresh: Vec<_> = entries
        .iter()
        .take_while(|entry| last_seq.map_or(true, |last| entry.seq > last))
        .collect();
    fresh.reverse();
    fresh
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.directory.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    } else {
        let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    }
}

/// Main entry point
///
/// Usage: `vibra-link [config.toml]`. Without a path the built-in defaults
/// are used (`/dev/rfcomm0`).
///
/// # Errors
///
/// Returns error if the configuration cannot be loaded. Link failures are
/// reported as state events, never as an exit.
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading configuration from {}", path))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.logging);
    info!("Vibra Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let transport = Arc::new(SerialTransport::new(&config.link));
    let link = VibraLink::new(config, transport, Arc::new(GrantedPermissions));
    link.start();

    let mut state = link.state();
    let mut snapshots = link.snapshot();
    let mut logs = link.logs();
    emit("state", &*state.borrow_and_update());

    link.connect_configured();
    info!("Type a command and press Enter; Ctrl+C to exit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_log = None;

    loop {
        tokio::select! {
            Ok(()) = state.changed() => {
                emit("state", &*state.borrow_and_update());
            }

            Ok(()) = snapshots.changed() => {
                emit("snapshot", &*snapshots.borrow_and_update());
            }

            Ok(()) = logs.changed() => {
                let entries = logs.borrow_and_update().clone();
                for entry in unseen(&entries, last_log) {
                    emit("log", entry);
                    last_log = Some(entry.seq);
                }
            }

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = link.telemetry().raw_command(&line) {
                        debug!("Command not sent: {}", e);
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    link.stop();
    Ok(())
}
