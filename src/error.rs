//! Error types for the assistant.

use std::time::Duration;

/// Failure of a single call to the external agent process.
///
/// Timeouts are kept apart from the other failure kinds because the user
/// hears a different reply for each.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent did not answer within the configured timeout.
    #[error("agent did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    /// The agent exited with a non-zero status.
    #[error("agent exited with code {code:?}: {stderr}")]
    NonZeroExit {
        /// Exit code, `None` when the process was terminated by a signal.
        code: Option<i32>,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// The agent exited successfully but printed nothing.
    #[error("agent returned an empty response")]
    EmptyOutput,

    /// The agent process could not be started or awaited.
    #[error("failed to run agent `{program}`: {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The call was cancelled while in flight.
    #[error("agent call was cancelled")]
    Cancelled,
}

impl AgentError {
    /// Whether this is the timeout kind.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech-to-text transcription error.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// External agent error.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Text-to-speech synthesis or playback error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Chat delivery error.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Configuration error (fatal at startup).
    #[error("config error: {0}")]
    Config(String),

    /// Audio capture error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Chat bridge error.
    #[error("chat error: {0}")]
    Chat(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
