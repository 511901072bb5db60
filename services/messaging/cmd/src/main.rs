//! gogoc messaging binary.
//!
//! Runs either end of the daemon/GUI IPC channel: the daemon role accepts
//! the pipe and answers requests, the GUI role connects and polls.

use clap::{Parser, ValueEnum};
use gogoc_session::{ConnectionState, DaemonMessenger, GuiMessenger, Statistics};
use gogoc_wire::GogocStatus;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod logging;

use config::MessagingConfig;
use handlers::{DaemonState, LoggingInfoHandler};
use logging::GogocLogFormatter;

// Component logging macros are defined in logging.rs and available via #[macro_export]

/// Which end of the channel to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunRole {
    /// Accept the pipe and answer requests
    Daemon,
    /// Connect to the daemon and poll it
    Gui,
}

/// gogoCLIENT IPC messaging endpoint
#[derive(Parser, Debug)]
#[command(name = "gogoc-messaging", version, about = "gogoCLIENT daemon/GUI IPC messaging")]
struct Args {
    /// Role to run
    #[arg(long, value_enum, default_value = "daemon")]
    role: RunRole,

    /// Rendezvous socket path (overrides config)
    #[arg(long)]
    pipe: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Statistics report interval, e.g. 30s
    #[arg(long, default_value = "30s")]
    report_interval: humantime::Duration,

    /// Supervisor tick, e.g. 300ms (overrides config)
    #[arg(long)]
    poll_interval: Option<humantime::Duration>,

    /// Pause after a failed connection attempt, e.g. 10s (overrides config)
    #[arg(long)]
    reconnect_cooldown: Option<humantime::Duration>,

    /// GUI request interval, e.g. 5s
    #[arg(long, default_value = "5s")]
    request_interval: humantime::Duration,

    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("gogoc_messaging={}", args.log_level).parse()?)
        .add_directive(format!("gogoc_session={}", args.log_level).parse()?)
        .add_directive(format!("gogoc_wire={}", args.log_level).parse()?);

    let formatter = GogocLogFormatter::new("gogoc-messaging");

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    info!("Starting gogoc messaging v{} ({:?})", env!("CARGO_PKG_VERSION"), args.role);

    let mut config = MessagingConfig::load_from_file(&args.config)?;
    if let Some(pipe) = &args.pipe {
        config.pipe_path = pipe.to_string_lossy().into_owned();
    }
    if let Some(poll) = args.poll_interval {
        config.poll_interval_ms = Duration::from(poll).as_millis() as u64;
    }
    if let Some(cooldown) = args.reconnect_cooldown {
        config.reconnect_cooldown_ms = Duration::from(cooldown).as_millis() as u64;
    }

    info!("Using pipe {}", config.pipe_path);

    let report_interval = Duration::from(args.report_interval);
    match args.role {
        RunRole::Daemon => run_daemon(config, report_interval).await,
        RunRole::Gui => run_gui(config, report_interval, args.request_interval.into()).await,
    }
}

fn report(role: &str, state: ConnectionState, stats: &Statistics) {
    match serde_json::to_string(stats) {
        Ok(json) => crate::component_info!(role, "state={} stats={}", state, json),
        Err(e) => warn!("Failed to render statistics: {}", e),
    }
}

/// Log a state transition; returns true once the manager has given up
fn on_state_event(
    role: &str,
    event: Result<ConnectionState, broadcast::error::RecvError>,
) -> bool {
    match event {
        Ok(ConnectionState::FatalError) => {
            crate::component_error!(role, "Messaging gave up after repeated failures");
            true
        }
        Ok(state) => {
            crate::component_info!(role, "Connection state: {}", state);
            false
        }
        Err(broadcast::error::RecvError::Lagged(missed)) => {
            debug!("Missed {} state events", missed);
            false
        }
        Err(broadcast::error::RecvError::Closed) => true,
    }
}

async fn run_daemon(config: MessagingConfig, report_interval: Duration) -> anyhow::Result<()> {
    let state = Arc::new(DaemonState::from_config(&config));
    let messenger = DaemonMessenger::init(state.clone(), config.messenger_config()).await?;
    let mut events = messenger.manager().subscribe();
    let mut ticker = tokio::time::interval(report_interval);
    let mut fatal = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => {
                match event {
                    Ok(ConnectionState::Connected) => {
                        state.set_status(GogocStatus::Connected, 0);
                        if let Err(code) = messenger.send_status_info() {
                            warn!("Status push failed: {}", code);
                        }
                    }
                    Ok(ConnectionState::Disconnected) => {
                        state.set_status(GogocStatus::DisconnectedIdle, 0);
                    }
                    _ => {}
                }
                if on_state_event("daemon", event) {
                    fatal = true;
                    break;
                }
            }
            _ = ticker.tick() => {
                if messenger.state() == ConnectionState::Connected {
                    if let Err(code) = messenger.send_status_info() {
                        warn!("Status push failed: {}", code);
                    }
                }
                report("daemon", messenger.state(), &messenger.statistics());
            }
        }
    }

    let stats = messenger.statistics();
    messenger.shutdown().await;
    report("daemon", ConnectionState::Disconnected, &stats);

    if fatal {
        anyhow::bail!("messaging failed permanently");
    }
    Ok(())
}

async fn run_gui(
    config: MessagingConfig,
    report_interval: Duration,
    request_interval: Duration,
) -> anyhow::Result<()> {
    let handler = Arc::new(LoggingInfoHandler::default());
    let messenger = GuiMessenger::init(handler.clone(), config.messenger_config()).await?;
    let mut events = messenger.manager().subscribe();
    let mut requests = tokio::time::interval(request_interval);
    let mut ticker = tokio::time::interval(report_interval);
    let mut fatal = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => {
                if on_state_event("gui", event) {
                    fatal = true;
                    break;
                }
            }
            _ = requests.tick() => {
                if messenger.state() == ConnectionState::Connected {
                    messenger.request_status_info();
                    messenger.request_tunnel_info();
                    messenger.request_broker_list();
                    messenger.request_haccess_status_info();
                }
            }
            _ = ticker.tick() => {
                report("gui", messenger.state(), &messenger.statistics());
                debug!("{} infos received", handler.received());
            }
        }
    }

    let stats = messenger.statistics();
    messenger.shutdown().await;
    report("gui", ConnectionState::Disconnected, &stats);

    if fatal {
        anyhow::bail!("messaging failed permanently");
    }
    Ok(())
}
