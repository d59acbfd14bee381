//! `simlink-monitor`: prints every command the simulation sends.
//!
//! Connects to the simulation with the settings file, registers a handler
//! for every command in the reference catalogue and prints what arrives,
//! draining the inbound queue once per tick the way a visualization frame
//! loop would.
//!
//! # Usage
//!
//! ```text
//! simlink-monitor [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Settings file [env: SIMLINK_CONFIG] [default: simlink.cfg]
//!   --host <HOST>       Overrides SIM_HOST from the settings file
//!   --port <PORT>       Overrides SIM_PORT from the settings file
//!   --format <FORMAT>   text | json [default: text]
//!   --tick-ms <MS>      Dispatch interval in milliseconds [default: 50]
//! ```
//!
//! Command output goes to stdout, one line per command; logs go to stderr.
//! The log filter comes from `RUST_LOG`, falling back to `LOG_LEVEL` from the
//! settings file.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_settings()             -- settings file + CLI overrides
//!  └─ ConnectionManager::start()  -- background connect/receive task
//!  └─ tick loop
//!       ├─ interval tick          -> Dispatcher::dispatch() -> print handlers
//!       ├─ state change           -> log it
//!       └─ Ctrl-C                 -> ConnectionManager::shutdown()
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use simlink_client::{load_settings, ClientSettings, ConnectionManager, Dispatcher, InboundQueue};
use simlink_core::{sim_command_factory, SimCommand};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// How each received command is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `Debug` rendering, prefixed with the variant name.
    Text,
    /// One JSON object per line.
    Json,
}

/// Simulation link monitor.
#[derive(Debug, Parser)]
#[command(
    name = "simlink-monitor",
    about = "Connects to a simulation and prints every command it sends",
    version
)]
struct Cli {
    /// Path of the `KEY value` settings file.  A missing file means defaults.
    #[arg(long, default_value = "simlink.cfg", env = "SIMLINK_CONFIG")]
    config: PathBuf,

    /// Simulation host, overriding `SIM_HOST`.
    #[arg(long)]
    host: Option<String>,

    /// Simulation port, overriding `SIM_PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Output format for received commands.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Interval between dispatch ticks in milliseconds.
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,
}

impl Cli {
    /// Loads the settings file and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be read or
    /// contains an invalid value.
    fn resolve_settings(&self) -> anyhow::Result<ClientSettings> {
        let mut settings = load_settings(&self.config)
            .with_context(|| format!("failed to load settings from {}", self.config.display()))?;
        if let Some(host) = &self.host {
            settings.sim_host = host.clone();
        }
        if let Some(port) = self.port {
            settings.sim_port = port;
        }
        Ok(settings)
    }
}

fn render(format: OutputFormat, command: &SimCommand) -> String {
    match format {
        OutputFormat::Text => format!("{:<14} {:?}", command.name(), command),
        OutputFormat::Json => match serde_json::to_string(command) {
            Ok(line) => line,
            Err(e) => {
                warn!(command = command.name(), error = %e, "failed to render command as JSON");
                format!("{{\"type\":\"{}\",\"error\":\"unrenderable\"}}", command.name())
            }
        },
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins when set; otherwise the settings file's LOG_LEVEL.
    let fallback = settings.log_level.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        addr = %settings.address(),
        format = ?cli.format,
        tick_ms = cli.tick_ms,
        "simlink-monitor starting"
    );

    // ── Protocol wiring ───────────────────────────────────────────────────────
    let factory = Arc::new(sim_command_factory());
    let inbound = Arc::new(InboundQueue::new());
    let manager = Arc::new(ConnectionManager::new(settings, factory, Arc::clone(&inbound)));

    let mut dispatcher = Dispatcher::new(inbound);
    let format = cli.format;
    for id in SimCommand::IDS {
        dispatcher.register_handler(id, move |command: SimCommand| {
            println!("{}", render(format, &command));
        });
    }

    let supervisor = manager.start();

    // ── Tick loop ─────────────────────────────────────────────────────────────
    let mut ticker = time::interval(Duration::from_millis(cli.tick_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut state_rx = manager.subscribe_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = dispatcher.dispatch();
                if report.total() > 0 {
                    debug!(dispatched = report.dispatched, unhandled = report.unhandled, "tick");
                }
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *state_rx.borrow_and_update();
                info!(%state, "connection state changed");
            }
            result = &mut ctrl_c => {
                result.context("failed to listen for Ctrl+C")?;
                info!("received Ctrl+C, shutting down");
                break;
            }
        }
    }

    manager.shutdown();
    supervisor.await.context("connection supervisor panicked")?;
    // Print whatever arrived between the last tick and shutdown.
    dispatcher.dispatch();

    info!(
        addr = %manager.settings().address(),
        connect_attempts = manager.connect_attempts(),
        sessions = manager.sessions_established(),
        "simlink-monitor stopped"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
