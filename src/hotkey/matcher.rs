//! Hotkey matcher lifecycle
//!
//! Owns the chord table and at most one listener thread. Registration is
//! all-or-nothing: either the tap is installed and the thread is running,
//! or nothing is left behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::swap::Snapshot;

use super::binding::BindingTable;
use super::permission::InputPermission;
use super::router::{EventRouter, HotkeyEvent};
use super::tap::{HotkeyError, TapBackend};

/// How long `register` waits for the backend to report installation
const INSTALL_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `unregister` waits for the listener thread to exit
const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Unregistered,
    Listening,
}

impl std::fmt::Display for MatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatcherState::Unregistered => write!(f, "Unregistered"),
            MatcherState::Listening => write!(f, "Listening"),
        }
    }
}

struct Listener {
    running: Arc<AtomicBool>,
    exited: std_mpsc::Receiver<()>,
    handle: thread::JoinHandle<()>,
}

impl Listener {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the loop and wait a bounded time for the thread to exit
    fn shutdown(self) {
        self.running.store(false, Ordering::SeqCst);

        match self.exited.recv_timeout(UNREGISTER_TIMEOUT) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!("hotkey listener thread panicked");
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = UNREGISTER_TIMEOUT.as_millis() as u64,
                    "hotkey listener did not exit in time, detaching"
                );
            }
        }
    }
}

/// Global hotkey matcher
pub struct HotkeyMatcher {
    bindings: Arc<Snapshot<BindingTable>>,
    main_tx: mpsc::Sender<HotkeyEvent>,
    backend: Arc<dyn TapBackend>,
    permission: Arc<dyn InputPermission>,
    listener: Mutex<Option<Listener>>,
}

impl HotkeyMatcher {
    pub fn new(
        bindings: BindingTable,
        main_tx: mpsc::Sender<HotkeyEvent>,
        backend: Arc<dyn TapBackend>,
        permission: Arc<dyn InputPermission>,
    ) -> Self {
        Self {
            bindings: Arc::new(Snapshot::new(bindings)),
            main_tx,
            backend,
            permission,
            listener: Mutex::new(None),
        }
    }

    /// Install the tap and start the listener thread.
    ///
    /// Returns false when permission is missing, no chord is configured or
    /// the tap could not be installed. None of these are fatal; call again
    /// once the cause is fixed.
    pub fn register(&self) -> bool {
        let mut slot = self.listener.lock();

        if let Some(listener) = slot.take() {
            if listener.is_alive() {
                *slot = Some(listener);
                return true;
            }
            warn!("hotkey listener exited unexpectedly, re-registering");
            listener.shutdown();
        }

        if !self.permission.is_granted() {
            warn!("input monitoring permission not granted, hotkeys disabled");
            return false;
        }

        if self.bindings.load().is_empty() {
            warn!("no hotkey bindings configured");
            return false;
        }

        match self.spawn_listener() {
            Ok(listener) => {
                *slot = Some(listener);
                info!(bindings = self.bindings.load().len(), "hotkey listener registered");
                true
            }
            Err(e) => {
                error!(%e, "failed to register hotkey listener");
                false
            }
        }
    }

    fn spawn_listener(&self) -> Result<Listener, HotkeyError> {
        let running = Arc::new(AtomicBool::new(true));
        let (installed_tx, installed_rx) = std_mpsc::channel();
        let (exited_tx, exited_rx) = std_mpsc::channel();

        let router = EventRouter::new(Arc::clone(&self.bindings), self.main_tx.clone());
        let backend = Arc::clone(&self.backend);
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");
                backend.run(router, thread_running, installed_tx);
                let _ = exited_tx.send(());
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        let listener = Listener {
            running,
            exited: exited_rx,
            handle,
        };

        match installed_rx.recv_timeout(INSTALL_TIMEOUT) {
            Ok(Ok(())) => Ok(listener),
            Ok(Err(e)) => {
                listener.shutdown();
                Err(e)
            }
            Err(_) => {
                listener.shutdown();
                Err(HotkeyError::EventTapCreation)
            }
        }
    }

    /// Tear down the tap and stop the listener thread. Idempotent.
    pub fn unregister(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.shutdown();
            info!("hotkey listener unregistered");
        }
    }

    pub fn state(&self) -> MatcherState {
        match &*self.listener.lock() {
            Some(listener) if listener.is_alive() => MatcherState::Listening,
            _ => MatcherState::Unregistered,
        }
    }

    /// Install a new chord table in one step
    pub fn set_bindings(&self, bindings: BindingTable) {
        let count = bindings.len();
        self.bindings.store(bindings);
        info!(bindings = count, "hotkey bindings updated");
    }

    pub fn bindings(&self) -> Arc<BindingTable> {
        self.bindings.load()
    }
}

impl Drop for HotkeyMatcher {
    fn drop(&mut self) {
        self.unregister();
    }
}
