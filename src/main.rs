//! vox-daemon: background daemon for system-wide text rewriting on macOS
//!
//! This daemon runs as a LaunchAgent and provides:
//! - Global hotkeys per rewrite mode via CGEventTap
//! - A rewrite dispatcher calling an OpenAI-compatible chat completions API
//! - IPC server for the menu bar app and the contextual-menu service
//!
//! Selected text is exchanged through the clipboard; the menu bar app is
//! responsible for copy/paste keystrokes and for showing notices.

mod config;
mod context;
mod credentials;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod rewrite;
mod surface;
mod swap;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, CONFIG_ENV};
use crate::context::{build_dispatcher, ControlEvent, MainContext};
use crate::events::DaemonEvent;
use crate::hotkey::{platform_backend, AccessibilityPermission, BindingTable, HotkeyMatcher};
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::{SignalEvent, Signals};
use crate::surface::ClipboardSurface;
use crate::swap::Snapshot;

#[derive(Debug, Parser)]
#[command(name = "vox-daemon", version, about = "Rewrite selected text with an LLM")]
struct Args {
    /// Path to the config file
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Path to the IPC socket, overriding the config file
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!(version = env!("CARGO_PKG_VERSION"), "vox-daemon starting");

    // Load configuration
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    if args.init_config {
        Config::init_at(&config_path)?;
        info!(config = %config_path.display(), "configuration written");
        return Ok(());
    }
    let config = Config::load_from(&config_path)?;
    let socket_path = match args.socket {
        Some(path) => path,
        None => config.socket_path()?,
    };
    info!(
        config = %config_path.display(),
        socket = %socket_path.display(),
        model = %config.model,
        thinking = config.thinking_mode,
        "configuration loaded"
    );

    let mut signals = Signals::new()?;

    // Listener thread -> main context
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // IPC server and signals -> main context
    let (control_tx, control_rx) = mpsc::channel(8);
    // Main context and IPC rewrites -> subscribed clients
    let (events_tx, _) = broadcast::channel::<DaemonEvent>(64);

    let dispatcher = Arc::new(Snapshot::new(build_dispatcher(&config)?));
    if !dispatcher.load().has_credential() {
        warn!(env = %config.api_key_env, "no API key configured, rewrites will fail until one is set");
    }

    let matcher = Arc::new(HotkeyMatcher::new(
        BindingTable::from_config(&config.hotkeys.bindings),
        hotkey_tx,
        platform_backend(),
        Arc::new(AccessibilityPermission),
    ));

    if config.hotkeys.enabled {
        if matcher.register() {
            info!(state = %matcher.state(), "hotkey listener started");
        } else {
            warn!("continuing without hotkey support - check Accessibility permissions");
        }
    } else {
        info!("hotkeys disabled in configuration");
    }

    let surface = ClipboardSurface::new()?;
    let mut main_context = MainContext::new(
        Arc::clone(&dispatcher),
        events_tx.clone(),
        Box::new(surface),
        Some(Arc::clone(&matcher)),
        config_path,
    )?;

    let server = Server::new(
        &socket_path,
        ServerContext {
            dispatcher,
            matcher: Some(Arc::clone(&matcher)),
            control_tx: control_tx.clone(),
            events_tx: events_tx.clone(),
        },
    )?;

    let mut log_rx = events_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Hotkey matches, rewrite results and reloads
        _ = main_context.run(hotkey_rx, control_rx) => {
            info!("main context exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "daemon event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event log receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event log exited");
        }

        // SIGHUP reloads, SIGINT/SIGTERM stop
        _ = async {
            while signals.next().await == SignalEvent::Reload {
                let (reply_tx, reply_rx) = oneshot::channel();
                if control_tx.send(ControlEvent::Reload(reply_tx)).await.is_err() {
                    break;
                }
                match reply_rx.await {
                    Ok(Ok(bindings)) => info!(bindings, "reloaded on SIGHUP"),
                    Ok(Err(message)) => error!(%message, "reload on SIGHUP failed"),
                    Err(_) => warn!("reload on SIGHUP was dropped"),
                }
            }
        } => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    matcher.unregister();
    server.shutdown().await;

    info!("vox-daemon stopped");

    Ok(())
}
