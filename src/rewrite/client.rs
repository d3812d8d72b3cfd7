//! Chat-completions transport
//!
//! Sends one OpenAI-compatible `chat/completions` request and reports the
//! outcome as either generated text or an unclassified [`CompletionFailure`].
//! Classification into user-facing errors happens in the dispatcher.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default endpoint when no custom base URL is configured
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// One completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub api_key: String,
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Raw failure from the transport, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionFailure {
    /// Non-2xx response from the API
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    /// Could not reach the endpoint or it timed out
    Transport(String),
    /// 2xx response that did not carry usable text
    Malformed(String),
}

/// Something that can run a completion request
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionFailure>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// `reqwest`-backed client for OpenAI-compatible endpoints
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ChatCompletionsClient {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint_for(base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn endpoint_for(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or(DEFAULT_BASE_URL);
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

/// Failures on the wire are transport failures; the rest is reported as is
fn request_failure(e: reqwest::Error) -> CompletionFailure {
    if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
        CompletionFailure::Transport(e.to_string())
    } else {
        CompletionFailure::Malformed(format!("request failed: {e}"))
    }
}

/// Pull message/code out of an error body, falling back to the raw text
fn parse_error_body(body: &str) -> (Option<String>, String) {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            let code = envelope.error.code.and_then(|c| match c {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            (code, envelope.error.message)
        }
        Err(_) => (None, body.trim().to_string()),
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionFailure> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
        };

        debug!(endpoint = %self.endpoint, model = %request.model, "sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&request.api_key)
            .json(&body)
            .send()
            .await
            .map_err(request_failure)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let (code, mut message) = parse_error_body(&text);
            if message.is_empty() {
                message = status.to_string();
            }
            return Err(CompletionFailure::Status {
                status: status.as_u16(),
                code,
                message,
            });
        }

        // Decoding happens below, so any failure here is the body read itself
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CompletionFailure::Transport(e.to_string()))?;
        let chat: ChatResponse = serde_json::from_slice(&bytes)
            .map_err(|e| CompletionFailure::Malformed(format!("response parse error: {e}")))?;

        let choice = chat.choices.into_iter().next().ok_or_else(|| {
            CompletionFailure::Malformed(
                "Empty response from API - check your model and base URL settings".to_string(),
            )
        })?;

        choice
            .message
            .content
            .ok_or_else(|| CompletionFailure::Malformed("API returned empty content".to_string()))
    }
}
