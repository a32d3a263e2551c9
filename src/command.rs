//! Control command detection.
//!
//! Detects control phrases in user text before it reaches the agent, so the
//! user can say "stopp" or type "reset" and have it handled locally instead
//! of being forwarded as a prompt.
//!
//! # Intents
//!
//! | Intent | Effect |
//! |--------|--------|
//! | `Cancel` | abort the in-flight agent call, acknowledge |
//! | `Reset` | forget the conversation, acknowledge |
//! | `Restart` | acknowledge, then restart the process |
//!
//! Matching is a case-insensitive substring test on whitespace-normalized
//! text. When several intents match, `Cancel` wins over `Reset`, which wins
//! over `Restart`.

use serde::{Deserialize, Serialize};

/// A control intent extracted from user text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlIntent {
    /// Ordinary input for the agent.
    #[default]
    None,
    /// Abort the current agent call.
    Cancel,
    /// Start a fresh conversation.
    Reset,
    /// Restart the assistant process.
    Restart,
}

/// Keyword lists for each control intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandKeywords {
    /// Phrases meaning "abort".
    pub cancel: Vec<String>,
    /// Phrases meaning "new conversation".
    pub reset: Vec<String>,
    /// Phrases meaning "restart the assistant".
    pub restart: Vec<String>,
}

impl Default for CommandKeywords {
    fn default() -> Self {
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(|w| (*w).to_owned()).collect() };
        Self {
            cancel: owned(&["stopp", "stop", "abbrechen", "cancel"]),
            reset: owned(&["neue session", "new session", "reset"]),
            restart: owned(&["neustart", "restart"]),
        }
    }
}

/// Classify `text` against the keyword lists.
#[must_use]
pub fn classify(text: &str, keywords: &CommandKeywords) -> ControlIntent {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return ControlIntent::None;
    }

    let ordered = [
        (ControlIntent::Cancel, &keywords.cancel),
        (ControlIntent::Reset, &keywords.reset),
        (ControlIntent::Restart, &keywords.restart),
    ];
    for (intent, phrases) in ordered {
        if matches_any(&normalized, phrases) {
            return intent;
        }
    }
    ControlIntent::None
}

fn matches_any(normalized: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| {
        let phrase = normalize(phrase);
        !phrase.is_empty() && normalized.contains(&phrase)
    })
}

/// Lowercase and collapse every whitespace run to a single space.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
