//! Speech-to-text.
//!
//! [`Transcriber`] turns an audio payload into text; [`TranscriptFilter`]
//! removes recognition artifacts afterwards. The concrete transcriber is
//! [`whisper::WhisperTranscriber`].

pub mod whisper;

use crate::error::{AssistantError, Result};
use crate::pipeline::messages::AudioPayload;
use regex::{Regex, RegexBuilder};

pub use whisper::WhisperTranscriber;

/// Audio to text.
pub trait Transcriber: Send {
    /// Transcribe one utterance.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AssistantError::Transcription`] if the audio cannot be
    /// transcribed.
    fn transcribe(&self, audio: &AudioPayload) -> Result<String>;
}

/// Deterministic, idempotent cleanup of recognised text.
pub trait TranscriptFilter: Send {
    /// Return the cleaned text. May be empty.
    fn filter(&self, text: &str) -> String;
}

/// Removes known hallucination phrases (case-insensitive) and collapses
/// whitespace.
///
/// Whisper tends to emit stock phrases such as broadcaster subtitle credits
/// on silence or noise.
#[derive(Debug, Clone)]
pub struct PhraseFilter {
    phrases: Option<Regex>,
}

impl PhraseFilter {
    /// Build a filter for `phrases`. Blank phrases are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AssistantError::Config`] if the combined pattern
    /// exceeds the regex size limit.
    pub fn new<S: AsRef<str>>(phrases: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = phrases
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { phrases: None });
        }
        let regex = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| AssistantError::Config(format!("stt.filter_phrases: {e}")))?;
        Ok(Self {
            phrases: Some(regex),
        })
    }
}

impl TranscriptFilter for PhraseFilter {
    fn filter(&self, text: &str) -> String {
        let mut current = collapse_whitespace(text);
        let Some(regex) = &self.phrases else {
            return current;
        };
        // Collapsing whitespace after a removal can form a new match.
        while regex.is_match(&current) {
            let removed = regex.replace_all(&current, " ");
            current = collapse_whitespace(&removed);
        }
        current
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
