//! Hotkey module for global keyboard event listening
//!
//! Uses a macOS CGEventTap on a dedicated thread to watch key-down events,
//! matches them against per-mode chords and hands matches to the main
//! context.

mod binding;
mod keys;
mod matcher;
mod permission;
mod router;
mod tap;

#[cfg(test)]
pub(crate) mod testing;

pub use binding::BindingTable;
pub use matcher::{HotkeyMatcher, MatcherState};
pub use permission::AccessibilityPermission;
pub use router::HotkeyEvent;
pub use tap::platform_backend;
