//! Configuration loading and management
//!
//! Settings live in a TOML file under the application support directory.
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::{ChainedCredentials, CredentialSource, EnvCredentials, FileCredentials};
use crate::rewrite::{ModelSettings, RewriteMode};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "VOX_CONFIG";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model identifier sent with every request
    pub model: String,

    /// OpenAI-compatible base URL; `None` means the public OpenAI API
    pub base_url: Option<String>,

    pub temperature: f32,

    /// Ask the model to reason step by step before answering
    pub thinking_mode: bool,

    pub request_timeout_secs: u64,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// File holding the API key, consulted after the environment
    pub api_key_file: Option<PathBuf>,

    /// Path to the Unix domain socket for IPC
    pub socket_path: Option<PathBuf>,

    pub hotkeys: HotkeyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub enabled: bool,

    /// In priority order: on a duplicate chord the earlier entry wins
    pub bindings: Vec<BindingConfig>,
}

/// One mode's chord as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub mode: RewriteMode,
    /// e.g. "cmd+shift"
    #[serde(default)]
    pub modifiers: String,
    /// A letter/digit or a numeric key code; empty disables the binding
    #[serde(default)]
    pub key: String,
}

impl BindingConfig {
    pub fn new(mode: RewriteMode, modifiers: &str, key: &str) -> Self {
        Self {
            mode,
            modifiers: modifiers.to_string(),
            key: key.trim().to_lowercase(),
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bindings: vec![
                BindingConfig::new(RewriteMode::FixGrammar, "ctrl+option", "g"),
                BindingConfig::new(RewriteMode::Professional, "ctrl+option", "p"),
                BindingConfig::new(RewriteMode::Concise, "ctrl+option", "c"),
                BindingConfig::new(RewriteMode::Friendly, "ctrl+option", "f"),
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.7,
            thinking_mode: false,
            request_timeout_secs: 60,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key_file: None,
            socket_path: None,
            hotkeys: HotkeyConfig::default(),
        }
    }
}

impl Config {
    /// Directory for config and runtime data
    pub fn data_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("Vox"))
    }

    /// Config file location, honouring `VOX_CONFIG`
    pub fn default_path() -> Result<PathBuf> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(Self::data_dir()?.join("config.toml")),
        }
    }

    /// Load from `path`, or return defaults if the file doesn't exist yet
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        Ok(config.normalized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create config directory")?;
        }
        let raw = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write config file at {}", path.display()))
    }

    /// Write the effective configuration back to `path`.
    ///
    /// Missing fields are filled with defaults and existing values kept, so
    /// the settings UI has a complete file to edit.
    pub fn init_at(path: &Path) -> Result<Self> {
        let config = Self::load_from(path)?;
        config.save_to(path)?;
        Ok(config)
    }

    fn normalized(mut self) -> Self {
        self.base_url = self
            .base_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        for binding in &mut self.hotkeys.bindings {
            binding.key = binding.key.trim().to_lowercase();
        }
        self
    }

    /// Socket path, defaulting to `daemon.sock` in the data directory
    pub fn socket_path(&self) -> Result<PathBuf> {
        match &self.socket_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("daemon.sock")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }

    /// Environment first, then the key file if one is configured
    pub fn credentials(&self) -> ChainedCredentials {
        let mut sources: Vec<Box<dyn CredentialSource>> =
            vec![Box::new(EnvCredentials::new(&self.api_key_env))];
        if let Some(path) = &self.api_key_file {
            sources.push(Box::new(FileCredentials::new(path)));
        }
        ChainedCredentials::new(sources)
    }
}
