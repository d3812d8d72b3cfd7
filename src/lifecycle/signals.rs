//! Signal handling for graceful shutdown and config reload

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::debug;

/// What a received signal asks the daemon to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGTERM or SIGINT
    Shutdown,
    /// SIGHUP
    Reload,
}

/// Handles SIGTERM, SIGINT and SIGHUP
pub struct Signals {
    sigterm: Signal,
    sigint: Signal,
    sighup: Signal,
}

impl Signals {
    /// Register the handlers. Must be called inside the runtime.
    pub fn new() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?,
            sigint: signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?,
            sighup: signal(SignalKind::hangup()).context("failed to register SIGHUP handler")?,
        })
    }

    /// Wait for the next signal
    pub async fn next(&mut self) -> SignalEvent {
        tokio::select! {
            _ = self.sigterm.recv() => {
                debug!("received SIGTERM");
                SignalEvent::Shutdown
            }
            _ = self.sigint.recv() => {
                debug!("received SIGINT");
                SignalEvent::Shutdown
            }
            _ = self.sighup.recv() => {
                debug!("received SIGHUP");
                SignalEvent::Reload
            }
        }
    }
}
