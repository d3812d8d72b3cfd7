//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::DaemonEvent;
use crate::rewrite::{ErrorKind, RewriteError, RewriteMode};

/// Requests from a UI or service adapter to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// List the rewrite modes and their chords
    ListModes,

    /// Rewrite `text` and return the result to this client
    Rewrite { mode: RewriteMode, text: String },

    /// Re-read the configuration file
    ReloadConfig,

    /// Subscribe to daemon event notifications
    Subscribe,
}

/// Responses from daemon to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    Modes { modes: Vec<ModeInfo> },

    /// Rewritten text, exactly as generated
    Rewritten { text: String },

    /// The rewrite failed; `title` and `message` are ready to show
    Failed {
        kind: ErrorKind,
        title: String,
        message: String,
    },

    /// Configuration applied; `bindings` chords are active
    Reloaded { bindings: usize },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn failed(error: &RewriteError) -> Self {
        let notice = error.notice();
        Response::Failed {
            kind: error.kind(),
            title: notice.title,
            message: notice.message,
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: DaemonEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the hotkey listener is running
    pub hotkey_registered: bool,

    /// Uptime in seconds
    pub uptime_secs: u64,

    pub model: String,

    /// Whether an API key is currently available
    pub has_api_key: bool,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hotkey_registered: false,
            uptime_secs: 0,
            model: String::new(),
            has_api_key: false,
        }
    }
}

/// One entry of the `modes` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInfo {
    pub mode: RewriteMode,
    pub display_name: String,
    /// Chord such as "ctrl+option+G"; absent when the mode has none
    pub binding: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::Rewrite {
            mode: RewriteMode::FixGrammar,
            text: "teh cat".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""type":"rewrite""#));
        assert!(json.contains("fix_grammar"));
    }

    #[test]
    fn test_request_deserialization() {
        let req: Request = serde_json::from_str(r#"{"type":"reload_config"}"#).unwrap();
        assert_eq!(req, Request::ReloadConfig);

        let req: Request =
            serde_json::from_str(r#"{"type":"rewrite","mode":"concise","text":"hi"}"#).unwrap();
        assert_eq!(
            req,
            Request::Rewrite {
                mode: RewriteMode::Concise,
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let result: Result<Request, _> =
            serde_json::from_str(r#"{"type":"rewrite","mode":"pirate","text":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("status"));
        assert!(json.contains("has_api_key"));
    }

    #[test]
    fn test_failed_response_carries_notice() {
        let resp = Response::failed(&RewriteError::MissingCredential);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"failed""#));
        assert!(json.contains("missing_credential"));
        assert!(json.contains("Vox - API Key Required"));
    }

    #[test]
    fn test_notification_wraps_event() {
        let note = Notification::Event {
            event: DaemonEvent::BindingsReloaded { count: 3 },
        };
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains("bindings_reloaded"));
    }
}
