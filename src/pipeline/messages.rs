//! Message types passed from producers to the worker.

use std::time::Instant;

/// Which producer created a message. Decides how the reply is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSource {
    /// Microphone capture after the wake word.
    Voice,
    /// Text typed into the terminal.
    Keyboard,
    /// Remote chat message.
    Chat,
}

impl MessageSource {
    /// Lowercase label for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Keyboard => "keyboard",
            Self::Chat => "chat",
        }
    }
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of payload carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// UTF-8 text.
    Text,
    /// Audio bytes that must be transcribed first.
    Audio,
}

/// Encoding of an audio payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioFormat {
    /// Raw signed 16-bit little-endian PCM.
    Pcm16 {
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Interleaved channel count.
        channels: u16,
    },
    /// A complete audio file (OGG, MP3, M4A, ...) as received from chat.
    Encoded {
        /// File name hint used for MIME detection by the transcription API.
        file_name: String,
    },
}

/// Audio bytes plus their encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// How `bytes` is encoded.
    pub format: AudioFormat,
}

impl AudioPayload {
    /// Raw PCM from the microphone.
    #[must_use]
    pub fn pcm16(bytes: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            bytes,
            format: AudioFormat::Pcm16 {
                sample_rate,
                channels,
            },
        }
    }

    /// An encoded audio file.
    #[must_use]
    pub fn encoded(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            format: AudioFormat::Encoded {
                file_name: file_name.into(),
            },
        }
    }

    /// Playback duration for PCM payloads. `None` for encoded files.
    #[must_use]
    pub fn pcm_duration_ms(&self) -> Option<u64> {
        match self.format {
            AudioFormat::Pcm16 {
                sample_rate,
                channels,
            } => {
                let bytes_per_second = u64::from(sample_rate) * u64::from(channels) * 2;
                if bytes_per_second == 0 {
                    return Some(0);
                }
                Some(self.bytes.len() as u64 * 1000 / bytes_per_second)
            }
            AudioFormat::Encoded { .. } => None,
        }
    }
}

/// Message payload. Exactly one kind is present, so the input type can never
/// disagree with the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// Text input.
    Text(String),
    /// Audio input.
    Audio(AudioPayload),
}

/// Where a chat reply must be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    /// Room the message arrived in.
    pub room_id: String,
    /// Sender of the message.
    pub sender: String,
    /// Event ID of the message.
    pub event_id: String,
}

/// The unit of work: one finalized user input.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    source: MessageSource,
    content: MessageContent,
    channel_ref: Option<ChannelRef>,
    created_at: Instant,
}

impl AssistantMessage {
    /// Typed text from the keyboard.
    #[must_use]
    pub fn keyboard(text: impl Into<String>) -> Self {
        Self::new(MessageSource::Keyboard, MessageContent::Text(text.into()), None)
    }

    /// A finished voice capture.
    #[must_use]
    pub fn voice(audio: AudioPayload) -> Self {
        Self::new(MessageSource::Voice, MessageContent::Audio(audio), None)
    }

    /// A chat message together with the reference needed to reply.
    #[must_use]
    pub fn chat(content: MessageContent, channel_ref: ChannelRef) -> Self {
        Self::new(MessageSource::Chat, content, Some(channel_ref))
    }

    fn new(source: MessageSource, content: MessageContent, channel_ref: Option<ChannelRef>) -> Self {
        Self {
            source,
            content,
            channel_ref,
            created_at: Instant::now(),
        }
    }

    /// Producer that created the message.
    #[must_use]
    pub fn source(&self) -> MessageSource {
        self.source
    }

    /// Payload kind.
    #[must_use]
    pub fn input_type(&self) -> InputType {
        match self.content {
            MessageContent::Text(_) => InputType::Text,
            MessageContent::Audio(_) => InputType::Audio,
        }
    }

    /// Payload.
    #[must_use]
    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// Reply target for chat messages.
    #[must_use]
    pub fn channel_ref(&self) -> Option<&ChannelRef> {
        self.channel_ref.as_ref()
    }

    /// When the producer finalized the input.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Text payload, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Audio(_) => None,
        }
    }
}

/// First `max_chars` characters of `text` on one line, for logs.
#[must_use]
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn room() -> ChannelRef {
        ChannelRef {
            room_id: "!room:example.org".to_owned(),
            sender: "@alice:example.org".to_owned(),
            event_id: "$event".to_owned(),
        }
    }

    #[test]
    fn keyboard_message_is_text_without_channel() {
        let msg = AssistantMessage::keyboard("hello");
        assert_eq!(msg.source(), MessageSource::Keyboard);
        assert_eq!(msg.input_type(), InputType::Text);
        assert_eq!(msg.text(), Some("hello"));
        assert!(msg.channel_ref().is_none());
    }

    #[test]
    fn voice_message_is_audio() {
        let msg = AssistantMessage::voice(AudioPayload::pcm16(vec![0; 3200], 16_000, 1));
        assert_eq!(msg.source(), MessageSource::Voice);
        assert_eq!(msg.input_type(), InputType::Audio);
        assert!(msg.text().is_none());
    }

    #[test]
    fn chat_message_keeps_channel_ref() {
        let msg = AssistantMessage::chat(MessageContent::Text("reset".to_owned()), room());
        assert_eq!(msg.source(), MessageSource::Chat);
        assert_eq!(msg.channel_ref(), Some(&room()));
    }

    #[test]
    fn chat_audio_is_audio_input() {
        let audio = AudioPayload::encoded(vec![1, 2, 3], "voice.ogg");
        let msg = AssistantMessage::chat(MessageContent::Audio(audio), room());
        assert_eq!(msg.input_type(), InputType::Audio);
    }

    #[test]
    fn pcm_duration_is_computed_from_format() {
        // 16 kHz mono s16le: 32000 bytes per second.
        let audio = AudioPayload::pcm16(vec![0; 16_000], 16_000, 1);
        assert_eq!(audio.pcm_duration_ms(), Some(500));
        let stereo = AudioPayload::pcm16(vec![0; 16_000], 16_000, 2);
        assert_eq!(stereo.pcm_duration_ms(), Some(250));
    }

    #[test]
    fn encoded_audio_has_no_pcm_duration() {
        let audio = AudioPayload::encoded(vec![0; 10], "a.ogg");
        assert_eq!(audio.pcm_duration_ms(), None);
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n b", 10), "a b");
        assert_eq!(preview("äöüäöü", 3), "äöü…");
    }

    #[test]
    fn source_labels() {
        assert_eq!(MessageSource::Voice.to_string(), "voice");
        assert_eq!(MessageSource::Chat.as_str(), "chat");
    }
}
