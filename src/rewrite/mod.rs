//! Rewrite dispatcher: presets, prompts, the remote call and its errors

mod client;
mod dispatcher;
mod error;
mod mode;

pub use client::{ChatCompletionsClient, CompletionClient, CompletionFailure, CompletionRequest};
pub use dispatcher::{Dispatcher, ModelSettings, RewriteRequest};
pub use error::{ErrorKind, Notice, RewriteError};
pub use mode::{PromptTable, RewriteMode};
