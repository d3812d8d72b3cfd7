//! Rewrite presets and their instruction prompts

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::PromptTableError;

/// The four rewrite presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteMode {
    /// Correct grammar, spelling and punctuation only
    FixGrammar,
    /// Formal, business-appropriate tone
    Professional,
    /// Shorter text with the same meaning
    Concise,
    /// Warm, casual tone
    Friendly,
}

impl RewriteMode {
    /// Every mode, in declaration order
    pub const ALL: [RewriteMode; 4] = [
        RewriteMode::FixGrammar,
        RewriteMode::Professional,
        RewriteMode::Concise,
        RewriteMode::Friendly,
    ];

    /// Label shown in menus, toasts and notifications
    pub fn display_name(&self) -> &'static str {
        match self {
            RewriteMode::FixGrammar => "Fix Grammar",
            RewriteMode::Professional => "Professional",
            RewriteMode::Concise => "Concise",
            RewriteMode::Friendly => "Friendly",
        }
    }

    /// Stable identifier used in config files and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            RewriteMode::FixGrammar => "fix_grammar",
            RewriteMode::Professional => "professional",
            RewriteMode::Concise => "concise",
            RewriteMode::Friendly => "friendly",
        }
    }
}

impl std::fmt::Display for RewriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PROMPT_FIX_GRAMMAR: &str = "\
You are a grammar and spelling assistant. Correct any grammar, spelling, \
and punctuation errors in the given text while preserving the original \
meaning, tone, and language. Return only the corrected text without \
any explanations or additional content.";

pub const PROMPT_PROFESSIONAL: &str = "\
You are a professional writing assistant. Rewrite the given text to be \
formal and business-appropriate while maintaining the original meaning \
and language. Use professional vocabulary and structure. Return only \
the rewritten text without any explanations or additional content.";

pub const PROMPT_CONCISE: &str = "\
You are a concise writing assistant. Shorten the given text while \
preserving the key meaning and information. Remove unnecessary words \
and redundancy while keeping the original language. Return only the \
shortened text without any explanations or additional content.";

pub const PROMPT_FRIENDLY: &str = "\
You are a friendly writing assistant. Rewrite the given text to have \
a warm, casual, and approachable tone while maintaining the original \
meaning and language. Return only the rewritten text without any \
explanations or additional content.";

/// Appended to the mode prompt when thinking mode is on
pub const THINKING_SUFFIX: &str = "\
Before providing your final answer, think through this step-by-step:
1. Analyze the original text's structure, tone, and key points
2. Identify areas that need improvement based on the rewrite goal
3. Consider multiple ways to improve the text
4. Select the best approach and apply it
5. Return only the final rewritten text without explanations";

fn builtin_prompt(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::FixGrammar => PROMPT_FIX_GRAMMAR,
        RewriteMode::Professional => PROMPT_PROFESSIONAL,
        RewriteMode::Concise => PROMPT_CONCISE,
        RewriteMode::Friendly => PROMPT_FRIENDLY,
    }
}

/// Read-only mapping from mode to system instruction.
///
/// Construction checks that every mode has a non-empty prompt and that no
/// two modes share one, so lookups afterwards cannot fail.
#[derive(Debug, Clone)]
pub struct PromptTable {
    prompts: HashMap<RewriteMode, &'static str>,
    thinking: bool,
}

impl PromptTable {
    /// The built-in prompt set
    pub fn builtin(thinking: bool) -> Result<Self, PromptTableError> {
        Self::from_entries(
            RewriteMode::ALL.iter().map(|&m| (m, builtin_prompt(m))),
            thinking,
        )
    }

    /// Build a table from explicit entries, validating coverage
    pub fn from_entries<I>(entries: I, thinking: bool) -> Result<Self, PromptTableError>
    where
        I: IntoIterator<Item = (RewriteMode, &'static str)>,
    {
        let mut prompts: HashMap<RewriteMode, &'static str> = HashMap::new();
        for (mode, prompt) in entries {
            if prompt.trim().is_empty() {
                return Err(PromptTableError(format!("empty prompt for {mode}")));
            }
            if let Some((other, _)) = prompts.iter().find(|(_, p)| **p == prompt) {
                return Err(PromptTableError(format!(
                    "{mode} shares its prompt with {other}"
                )));
            }
            prompts.insert(mode, prompt);
        }

        if let Some(missing) = RewriteMode::ALL.iter().find(|m| !prompts.contains_key(*m)) {
            return Err(PromptTableError(format!("no prompt for {missing}")));
        }

        Ok(Self { prompts, thinking })
    }

    /// The full system instruction for a mode
    pub fn system_prompt(&self, mode: RewriteMode) -> String {
        // Coverage is checked in `from_entries`
        let base = self.prompts.get(&mode).copied().unwrap_or_default();
        if self.thinking {
            format!("{base}\n\n{THINKING_SUFFIX}")
        } else {
            base.to_string()
        }
    }

    pub fn thinking(&self) -> bool {
        self.thinking
    }
}
