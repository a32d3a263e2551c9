use crate::audio::playback::PcmPlayer;
use crate::config::TtsConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::router::Speaker;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Speech through the OpenAI TTS API.
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
    sample_rate: u32,
    player: PcmPlayer,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
    speed: f32,
}

impl OpenAiSpeech {
    /// Create a speaker reading the API key from `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] when the key is unset, the player
    /// command is empty, or the HTTP client cannot be built.
    pub fn from_env(config: &TtsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            AssistantError::Config(format!("{} is not set", config.api_key_env))
        })?;
        let player = PcmPlayer::new(config.player_command.clone())?;
        Self::new(config, api_key, player)
    }

    /// Create a speaker with an explicit key and player.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &TtsConfig, api_key: impl Into<String>, player: PcmPlayer) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AssistantError::Config(format!("tts http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/audio/speech", config.api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            sample_rate: config.sample_rate,
            player,
        })
    }

    fn request(&self, text: &str) -> Result<reqwest::blocking::Response> {
        let body = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: "pcm",
            speed: self.speed,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| AssistantError::Synthesis(format!("speech request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AssistantError::Synthesis(format!(
                "speech API returned {status}: {}",
                body.trim()
            )));
        }
        Ok(response)
    }
}

impl Speaker for OpenAiSpeech {
    fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::Synthesis("no text to speak".to_owned()));
        }
        let started = Instant::now();
        let mut response = self.request(text)?;
        self.player
            .play_from(&mut response, self.sample_rate)
            .map_err(|e| AssistantError::Synthesis(e.to_string()))?;
        tracing::info!(
            chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reply spoken"
        );
        Ok(())
    }
}
