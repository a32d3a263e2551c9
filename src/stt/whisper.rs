//! OpenAI-compatible `/audio/transcriptions` client.
//!
//! Microphone PCM is wrapped into an in-memory WAV file; encoded chat voice
//! notes are uploaded as they are, with their file name as the format hint.

use super::Transcriber;
use crate::config::SttConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{AudioFormat, AudioPayload};
use reqwest::blocking::multipart;
use serde::Deserialize;
use std::io::Cursor;
use std::time::{Duration, Instant};

/// Whisper API transcriber.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    language: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl WhisperTranscriber {
    /// Create a transcriber reading the API key from `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] when the key variable is unset or
    /// the HTTP client cannot be built.
    pub fn from_env(config: &SttConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            AssistantError::Config(format!("{} is not set", config.api_key_env))
        })?;
        Self::new(config, api_key)
    }

    /// Create a transcriber with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &SttConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("stt http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/audio/transcriptions",
                config.api_base.trim_end_matches('/')
            ),
            api_key: api_key.into(),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    fn upload(&self, bytes: Vec<u8>, file_name: String) -> Result<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| AssistantError::Transcription(e.to_string()))?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| AssistantError::Transcription(format!("whisper request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AssistantError::Transcription(format!(
                "whisper API returned {status}: {}",
                body.trim()
            )));
        }
        let parsed: TranscriptionResponse = response
            .json()
            .map_err(|e| AssistantError::Transcription(format!("invalid whisper response: {e}")))?;
        Ok(parsed.text.trim().to_owned())
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &AudioPayload) -> Result<String> {
        if audio.bytes.is_empty() {
            return Err(AssistantError::Transcription(
                "no audio data to transcribe".to_owned(),
            ));
        }
        let started = Instant::now();
        let (bytes, file_name) = match &audio.format {
            AudioFormat::Pcm16 {
                sample_rate,
                channels,
            } => {
                tracing::info!(
                    duration_ms = audio.pcm_duration_ms().unwrap_or_default(),
                    "transcribing microphone audio"
                );
                (
                    pcm_to_wav(&audio.bytes, *sample_rate, *channels)?,
                    "audio.wav".to_owned(),
                )
            }
            AudioFormat::Encoded { file_name } => {
                tracing::info!(%file_name, bytes = audio.bytes.len(), "transcribing audio file");
                (audio.bytes.clone(), file_name.clone())
            }
        };
        let text = self.upload(bytes, file_name)?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            text = %text,
            "transcription complete"
        );
        Ok(text)
    }
}

/// Wrap s16le PCM into a WAV container.
///
/// # Errors
///
/// Returns [`AssistantError::Transcription`] if the WAV cannot be written.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::with_capacity(pcm.len() + 44);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)
        .map_err(|e| AssistantError::Transcription(format!("failed to create wav writer: {e}")))?;
    for chunk in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))
            .map_err(|e| AssistantError::Transcription(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| AssistantError::Transcription(format!("failed to finalize wav: {e}")))?;
    Ok(buf)
}
