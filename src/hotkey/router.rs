//! Event matching on the listener thread
//!
//! The router runs inside the tap callback, so it only compares the event
//! against the current chord table and hands matches to the main context.
//! It never runs a handler itself.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::rewrite::RewriteMode;
use crate::swap::Snapshot;

use super::binding::BindingTable;
use super::keys::Modifiers;

/// Events sent from the hotkey listener to the main context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// A configured chord was pressed
    Triggered(RewriteMode),
    /// Event tap was disabled by user input; matching may be interrupted
    TapDisabled,
}

/// Raw input observed by the tap, already decoded from the OS event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEvent {
    KeyDown {
        key_code: u16,
        modifiers: Modifiers,
        autorepeat: bool,
    },
    /// The OS disabled the tap because a callback took too long
    DisabledByTimeout,
    DisabledByUserInput,
    Other,
}

/// What the tap should do with the event it just delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    PassThrough,
    /// Swallow the event so the foreground app never sees it
    Suppress,
    /// Pass the event through and turn the tap back on
    ReEnable,
}

/// Matches tap events against the shared chord table
#[derive(Clone)]
pub struct EventRouter {
    bindings: Arc<Snapshot<BindingTable>>,
    main_tx: mpsc::Sender<HotkeyEvent>,
}

impl EventRouter {
    pub fn new(bindings: Arc<Snapshot<BindingTable>>, main_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self { bindings, main_tx }
    }

    /// Decide the fate of one event. Must stay fast and non-blocking.
    pub fn route(&self, event: TapEvent) -> TapAction {
        match event {
            TapEvent::KeyDown {
                key_code,
                modifiers,
                autorepeat,
            } => {
                if autorepeat {
                    return TapAction::PassThrough;
                }
                match self.match_chord(key_code, modifiers) {
                    Some(mode) => {
                        info!(%mode, %modifiers, key_code, "hotkey triggered");
                        self.hand_off(HotkeyEvent::Triggered(mode));
                        TapAction::Suppress
                    }
                    None => TapAction::PassThrough,
                }
            }
            TapEvent::DisabledByTimeout => {
                warn!("event tap disabled by timeout, re-enabling");
                TapAction::ReEnable
            }
            TapEvent::DisabledByUserInput => {
                warn!("event tap disabled by user input");
                self.hand_off(HotkeyEvent::TapDisabled);
                TapAction::PassThrough
            }
            TapEvent::Other => TapAction::PassThrough,
        }
    }

    /// Match against one snapshot of the table
    pub fn match_chord(&self, key_code: u16, modifiers: Modifiers) -> Option<RewriteMode> {
        let table = self.bindings.load();
        table.find(key_code, modifiers)
    }

    fn hand_off(&self, event: HotkeyEvent) {
        // We're on the tap thread, so never block here
        match self.main_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "main context busy, hotkey event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(?event, "main context gone, hotkey event dropped");
            }
        }
    }
}
