//! Text-to-speech.
//!
//! [`OpenAiSpeech`] requests raw PCM from an OpenAI-compatible
//! `/audio/speech` endpoint and streams it into the playback process while
//! it downloads.

mod openai;

pub use openai::OpenAiSpeech;
