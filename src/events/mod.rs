//! Events module for rewrite progress
//!
//! Published by the main context and pushed to subscribed IPC clients so a
//! UI can show a toast while a rewrite runs and a banner when it fails.

use serde::{Deserialize, Serialize};

use crate::rewrite::{ErrorKind, Notice, RewriteMode};

/// Where a rewrite request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Hotkey,
    Ipc,
}

/// Events emitted by the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonEvent {
    /// A rewrite was handed to a worker
    RewriteStarted {
        mode: RewriteMode,
        trigger: Trigger,
        /// Toast text, e.g. "Fix Grammar with Vox..."
        label: String,
    },

    /// The rewritten text was delivered
    RewriteCompleted {
        mode: RewriteMode,
        trigger: Trigger,
        /// Duration in milliseconds from trigger to result
        duration_ms: u64,
    },

    /// The rewrite failed; `notice` is what the user should see
    RewriteFailed {
        mode: RewriteMode,
        trigger: Trigger,
        kind: ErrorKind,
        notice: Notice,
    },

    /// Hotkey chords were reloaded from configuration
    BindingsReloaded { count: usize },

    /// The OS switched the input tap off
    HotkeyTapDisabled,
}

impl DaemonEvent {
    pub fn started(mode: RewriteMode, trigger: Trigger) -> Self {
        DaemonEvent::RewriteStarted {
            mode,
            trigger,
            label: format!("{} with Vox...", mode.display_name()),
        }
    }
}

impl std::fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonEvent::RewriteStarted { mode, .. } => write!(f, "REWRITE_STARTED ({mode})"),
            DaemonEvent::RewriteCompleted {
                mode, duration_ms, ..
            } => {
                write!(f, "REWRITE_COMPLETED ({mode}, {duration_ms}ms)")
            }
            DaemonEvent::RewriteFailed { mode, kind, .. } => {
                write!(f, "REWRITE_FAILED ({mode}, {kind:?})")
            }
            DaemonEvent::BindingsReloaded { count } => write!(f, "BINDINGS_RELOADED ({count})"),
            DaemonEvent::HotkeyTapDisabled => write!(f, "HOTKEY_TAP_DISABLED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::RewriteError;

    #[test]
    fn test_event_serialization() {
        let event = DaemonEvent::RewriteCompleted {
            mode: RewriteMode::Concise,
            trigger: Trigger::Hotkey,
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("rewrite_completed"));
        assert!(json.contains("concise"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"hotkey_tap_disabled"}"#;
        let event: DaemonEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, DaemonEvent::HotkeyTapDisabled));
    }

    #[test]
    fn test_started_label() {
        let event = DaemonEvent::started(RewriteMode::FixGrammar, Trigger::Ipc);
        match event {
            DaemonEvent::RewriteStarted { label, .. } => assert_eq!(label, "Fix Grammar with Vox..."),
            other => panic!("unexpected event: {other}"),
        }
    }

    #[test]
    fn test_failed_event_carries_notice() {
        let err = RewriteError::RateLimited;
        let event = DaemonEvent::RewriteFailed {
            mode: RewriteMode::Friendly,
            trigger: Trigger::Hotkey,
            kind: err.kind(),
            notice: err.notice(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("rate_limited"));
        assert!(json.contains("please wait"));
    }
}
