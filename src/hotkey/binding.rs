//! Per-mode chord bindings

use tracing::warn;

use crate::config::BindingConfig;
use crate::rewrite::RewriteMode;

use super::keys::{char_for_key_code, parse_key, Modifiers};

/// A chord: exact modifier set plus one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HotkeyBinding {
    pub modifiers: Modifiers,
    pub key_code: u16,
}

impl HotkeyBinding {
    pub fn new(modifiers: Modifiers, key_code: u16) -> Self {
        Self {
            modifiers,
            key_code,
        }
    }

    /// Exact match: same key and the same modifier set, nothing extra held
    pub fn matches(&self, key_code: u16, modifiers: Modifiers) -> bool {
        self.key_code == key_code && self.modifiers == modifiers
    }
}

impl std::fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.modifiers.is_empty() {
            write!(f, "{}+", self.modifiers)?;
        }
        match char_for_key_code(self.key_code) {
            Some(c) => write!(f, "{}", c.to_ascii_uppercase()),
            None => write!(f, "0x{:02X}", self.key_code),
        }
    }
}

/// Ordered chord table.
///
/// Iteration order is registration order; when two modes share a chord the
/// one registered first wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingTable {
    entries: Vec<(RewriteMode, HotkeyBinding)>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding
    pub fn with(mut self, mode: RewriteMode, binding: HotkeyBinding) -> Self {
        self.push(mode, binding);
        self
    }

    pub fn push(&mut self, mode: RewriteMode, binding: HotkeyBinding) {
        if let Some((first, _)) = self.entries.iter().find(|(_, b)| *b == binding) {
            warn!(
                %binding,
                shadowed = %mode,
                winner = %first,
                "duplicate hotkey chord, first registered binding wins"
            );
        }
        self.entries.push((mode, binding));
    }

    /// Build from configuration, skipping disabled or unparseable keys
    pub fn from_config(configs: &[BindingConfig]) -> Self {
        let mut table = Self::new();
        for cfg in configs {
            if cfg.key.trim().is_empty() {
                continue;
            }
            match parse_key(&cfg.key) {
                Some(key_code) => {
                    table.push(cfg.mode, HotkeyBinding::new(Modifiers::parse(&cfg.modifiers), key_code));
                }
                None => {
                    warn!(mode = %cfg.mode, key = %cfg.key, "unknown hotkey key, binding skipped");
                }
            }
        }
        table
    }

    /// First mode whose chord exactly matches the event
    pub fn find(&self, key_code: u16, modifiers: Modifiers) -> Option<RewriteMode> {
        self.entries
            .iter()
            .find(|(_, b)| b.matches(key_code, modifiers))
            .map(|(mode, _)| *mode)
    }

    pub fn binding_for(&self, mode: RewriteMode) -> Option<HotkeyBinding> {
        self.entries
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, b)| *b)
    }

    pub fn entries(&self) -> &[(RewriteMode, HotkeyBinding)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
