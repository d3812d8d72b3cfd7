//! API key lookup
//!
//! The key is opaque to the daemon. It is read on every rewrite so a key
//! set after startup takes effect without a reload.

use std::path::PathBuf;

use tracing::warn;

/// Source of the remote API key
pub trait CredentialSource: Send + Sync {
    /// The key, if one is configured and non-empty
    fn api_key(&self) -> Option<String>;
}

/// Reads the key from an environment variable
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        std::env::var(&self.var).ok().and_then(non_empty)
    }
}

/// Reads the key from the first line of a file
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileCredentials {
    fn api_key(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents.lines().next().map(str::to_string).and_then(non_empty),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = ?self.path, ?e, "failed to read API key file");
                None
            }
        }
    }
}

/// Tries each source in order
pub struct ChainedCredentials {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainedCredentials {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }
}

impl CredentialSource for ChainedCredentials {
    fn api_key(&self) -> Option<String> {
        self.sources.iter().find_map(|s| s.api_key())
    }
}

fn non_empty(key: String) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}
