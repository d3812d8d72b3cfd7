//! Error taxonomy surfaced to callers of the dispatcher

use serde::{Deserialize, Serialize};

/// Every way a rewrite can fail, after classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    /// Selected text was empty or whitespace; nothing was sent
    #[error("no text to rewrite")]
    EmptyText,

    #[error("no API key configured")]
    MissingCredential,

    #[error("API key rejected by the remote API")]
    InvalidCredential,

    #[error("rate limit or quota exceeded")]
    RateLimited,

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("{0}")]
    RemoteFailure(String),

    /// Reading the selection or placing the result failed locally
    #[error("text surface failure: {0}")]
    SurfaceFailure(String),
}

/// Stable machine-readable kind, used on the IPC wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyText,
    MissingCredential,
    InvalidCredential,
    RateLimited,
    TransportFailure,
    RemoteFailure,
    SurfaceFailure,
}

/// A user-facing notification for a failed rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    fn new(title: &str, message: impl Into<String>) -> Self {
        Self {
            title: title.to_string(),
            message: message.into(),
        }
    }
}

impl RewriteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RewriteError::EmptyText => ErrorKind::EmptyText,
            RewriteError::MissingCredential => ErrorKind::MissingCredential,
            RewriteError::InvalidCredential => ErrorKind::InvalidCredential,
            RewriteError::RateLimited => ErrorKind::RateLimited,
            RewriteError::TransportFailure(_) => ErrorKind::TransportFailure,
            RewriteError::RemoteFailure(_) => ErrorKind::RemoteFailure,
            RewriteError::SurfaceFailure(_) => ErrorKind::SurfaceFailure,
        }
    }

    /// The single notification shown to the user for this error
    pub fn notice(&self) -> Notice {
        match self {
            RewriteError::EmptyText => Notice::new("Vox", "No text selected"),
            RewriteError::MissingCredential => Notice::new(
                "Vox - API Key Required",
                "Please set your OpenAI API key in Vox settings",
            ),
            RewriteError::InvalidCredential => {
                Notice::new("Vox - Invalid API Key", "Invalid API key - check Vox settings")
            }
            RewriteError::RateLimited => {
                Notice::new("Vox - Rate Limit", "Rate limit reached - please wait")
            }
            RewriteError::TransportFailure(_) => {
                Notice::new("Vox - Network Error", "Network error - check your connection")
            }
            RewriteError::RemoteFailure(message) => Notice::new("Vox Error", message.as_str()),
            RewriteError::SurfaceFailure(_) => Notice::new(
                "Vox - Clipboard Error",
                "Could not access the clipboard - please try again",
            ),
        }
    }
}

/// Rejected prompt table at startup
#[derive(Debug, thiserror::Error)]
#[error("invalid prompt table: {0}")]
pub struct PromptTableError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_notices_point_at_settings() {
        assert!(RewriteError::MissingCredential.notice().message.contains("settings"));
        assert!(RewriteError::InvalidCredential.notice().message.contains("settings"));
    }

    #[test]
    fn test_rate_limit_notice_asks_for_patience() {
        assert!(RewriteError::RateLimited.notice().message.contains("please wait"));
    }

    #[test]
    fn test_transport_notice_mentions_connection() {
        let notice = RewriteError::TransportFailure("dns".into()).notice();
        assert!(notice.message.contains("connection"));
        assert!(!notice.message.contains("dns"));
    }

    #[test]
    fn test_remote_notice_is_verbatim() {
        let notice = RewriteError::RemoteFailure("model `x` does not exist".into()).notice();
        assert_eq!(notice.message, "model `x` does not exist");
    }

    #[test]
    fn test_surface_notice_hides_detail() {
        let err = RewriteError::SurfaceFailure("pasteboard locked".into());
        assert_eq!(err.kind(), ErrorKind::SurfaceFailure);
        let notice = err.notice();
        assert_eq!(notice.title, "Vox - Clipboard Error");
        assert!(notice.message.contains("clipboard"));
        assert!(!notice.message.contains("pasteboard locked"));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&RewriteError::RateLimited.kind()).unwrap();
        assert_eq!(json, r#""rate_limited""#);
    }
}
