//! Reply routing: send each reply back where its message came from.
//!
//! | Source | Display | Sink |
//! |--------|---------|------|
//! | Voice | yes | speech |
//! | Keyboard | yes | none |
//! | Chat | yes | chat room of the originating message |
//!
//! The display and the sink are independent: a sink failure never hides the
//! text from the display, and nothing here returns an error to the worker.

use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{ChannelRef, MessageSource};

/// Terminal transcript.
pub trait Display: Send + Sync {
    /// Show recognised user input.
    fn user_input(&self, source: MessageSource, text: &str);
    /// Show an assistant reply.
    fn reply(&self, source: MessageSource, text: &str);
    /// Show a status or error line.
    fn notice(&self, text: &str);
}

/// Text-to-speech output.
pub trait Speaker: Send {
    /// Speak `text` and return once playback has finished.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Synthesis`] when synthesis or playback fails.
    fn speak(&self, text: &str) -> Result<()>;
}

/// Outgoing chat delivery.
pub trait ChatSender: Send {
    /// Post `text` into the room referenced by `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Delivery`] when the message cannot be sent.
    fn send(&self, channel: &ChannelRef, text: &str) -> Result<()>;
}

/// Non-verbal error signal. Must not fail.
pub trait ErrorChime: Send {
    /// Play the error sound.
    fn chime(&self);
}

/// Chime that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentChime;

impl ErrorChime for SilentChime {
    fn chime(&self) {}
}

/// Dispatches replies to the display and the source's sink.
pub struct Router {
    display: std::sync::Arc<dyn Display>,
    speaker: Option<Box<dyn Speaker>>,
    chat: Option<Box<dyn ChatSender>>,
    chime: Box<dyn ErrorChime>,
}

impl Router {
    /// Router with display only. Speech and chat sinks are optional.
    pub fn new(display: std::sync::Arc<dyn Display>) -> Self {
        Self {
            display,
            speaker: None,
            chat: None,
            chime: Box::new(SilentChime),
        }
    }

    /// Attach the speech sink.
    #[must_use]
    pub fn with_speaker(mut self, speaker: Box<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Attach the chat sink.
    #[must_use]
    pub fn with_chat(mut self, chat: Box<dyn ChatSender>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Attach the error chime.
    #[must_use]
    pub fn with_chime(mut self, chime: Box<dyn ErrorChime>) -> Self {
        self.chime = chime;
        self
    }

    /// The display this router writes to.
    #[must_use]
    pub fn display(&self) -> &dyn Display {
        self.display.as_ref()
    }

    /// Play the error chime.
    pub fn chime(&self) {
        self.chime.chime();
    }

    /// Deliver `text` according to `source`.
    pub fn route(&self, source: MessageSource, channel: Option<&ChannelRef>, text: &str) {
        self.display.reply(source, text);
        match source {
            MessageSource::Voice => self.speak(text),
            MessageSource::Keyboard => {}
            MessageSource::Chat => self.deliver(channel, text),
        }
    }

    /// Post `text` to chat without showing it as a reply. Used for transcript
    /// quotes.
    pub fn quote_to_chat(&self, channel: Option<&ChannelRef>, text: &str) {
        self.deliver(channel, text);
    }

    fn speak(&self, text: &str) {
        let Some(speaker) = &self.speaker else {
            tracing::debug!("speech output disabled; reply shown on display only");
            return;
        };
        if let Err(e) = speaker.speak(text) {
            tracing::error!("speech output failed: {e}");
            self.chime.chime();
        }
    }

    fn deliver(&self, channel: Option<&ChannelRef>, text: &str) {
        let result = match (channel, &self.chat) {
            (Some(channel), Some(chat)) => chat.send(channel, text),
            (None, _) => Err(AssistantError::Delivery(
                "chat message has no reply channel".to_owned(),
            )),
            (Some(_), None) => Err(AssistantError::Delivery(
                "chat bridge is not running".to_owned(),
            )),
        };
        if let Err(e) = result {
            tracing::error!("chat delivery failed: {e}");
            self.display.notice(&format!("Could not deliver reply to chat: {e}"));
        }
    }
}
