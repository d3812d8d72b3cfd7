//! Rewrite dispatcher
//!
//! Maps a mode to its instruction, runs exactly one completion call and
//! classifies every failure into a [`RewriteError`]. It never touches the
//! clipboard or any UI; the caller places the result.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::credentials::CredentialSource;

use super::client::{CompletionClient, CompletionFailure, CompletionRequest};
use super::{PromptTable, RewriteError, RewriteMode};

/// One rewrite invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    pub text: String,
    pub mode: RewriteMode,
}

impl RewriteRequest {
    pub fn new(text: impl Into<String>, mode: RewriteMode) -> Self {
        Self {
            text: text.into(),
            mode,
        }
    }
}

/// Model settings the dispatcher was built with
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
}

/// Executes rewrite requests against the remote API
pub struct Dispatcher {
    prompts: PromptTable,
    client: Arc<dyn CompletionClient>,
    credentials: Arc<dyn CredentialSource>,
    settings: ModelSettings,
}

impl Dispatcher {
    pub fn new(
        prompts: PromptTable,
        client: Arc<dyn CompletionClient>,
        credentials: Arc<dyn CredentialSource>,
        settings: ModelSettings,
    ) -> Self {
        Self {
            prompts,
            client,
            credentials,
            settings,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Whether an API key is currently available
    pub fn has_credential(&self) -> bool {
        self.credentials.api_key().is_some()
    }

    /// Rewrite `request.text` according to `request.mode`.
    ///
    /// Returns the generated text exactly as the API produced it.
    pub async fn rewrite(&self, request: RewriteRequest) -> Result<String, RewriteError> {
        if request.text.trim().is_empty() {
            return Err(RewriteError::EmptyText);
        }

        let api_key = self
            .credentials
            .api_key()
            .ok_or(RewriteError::MissingCredential)?;

        let started = Instant::now();
        let call = CompletionRequest {
            api_key,
            model: self.settings.model.clone(),
            system: self.prompts.system_prompt(request.mode),
            user: request.text,
            temperature: self.settings.temperature,
        };

        match self.client.complete(call).await {
            Ok(text) => {
                info!(
                    mode = %request.mode,
                    model = %self.settings.model,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "rewrite complete"
                );
                Ok(text)
            }
            Err(failure) => {
                let error = classify(failure);
                warn!(mode = %request.mode, kind = ?error.kind(), %error, "rewrite failed");
                Err(error)
            }
        }
    }
}

/// Map a transport failure onto exactly one error kind.
///
/// Checks run in a fixed order and the first hit wins: credential codes,
/// throughput signals, connectivity, authentication wording, then
/// everything else as a remote failure with its message.
pub fn classify(failure: CompletionFailure) -> RewriteError {
    match failure {
        CompletionFailure::Transport(detail) => RewriteError::TransportFailure(detail),
        CompletionFailure::Malformed(message) => classify_message(None, None, message),
        CompletionFailure::Status {
            status,
            code,
            message,
        } => classify_message(Some(status), code.as_deref(), message),
    }
}

fn classify_message(status: Option<u16>, code: Option<&str>, message: String) -> RewriteError {
    let lower = message.to_lowercase();

    if status == Some(401) || code == Some("invalid_api_key") {
        RewriteError::InvalidCredential
    } else if status == Some(429)
        || matches!(code, Some("rate_limit_exceeded" | "insufficient_quota" | "429"))
        || ["rate limit", "rate_limit", "ratelimit"]
            .iter()
            .any(|needle| lower.contains(needle))
    {
        RewriteError::RateLimited
    } else if lower.contains("connection") || lower.contains("network") {
        RewriteError::TransportFailure(message)
    } else if lower.contains("authentication") {
        RewriteError::InvalidCredential
    } else if let Some(status) = status {
        RewriteError::RemoteFailure(format!("API error {status}: {message}"))
    } else {
        RewriteError::RemoteFailure(message)
    }
}
