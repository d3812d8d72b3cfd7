//! Main context: handler dispatch and result placement

mod handlers;
mod main_loop;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::rewrite::{ChatCompletionsClient, Dispatcher, PromptTable};

pub use main_loop::{ControlEvent, MainContext};

/// Build a dispatcher from the current configuration
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher> {
    let prompts = PromptTable::builtin(config.thinking_mode).context("failed to build prompt table")?;
    let client = ChatCompletionsClient::new(config.base_url.as_deref(), config.request_timeout())
        .context("failed to build HTTP client")?;

    Ok(Dispatcher::new(
        prompts,
        Arc::new(client),
        Arc::new(config.credentials()),
        config.model_settings(),
    ))
}
