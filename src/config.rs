//! Configuration types for the assistant.

use crate::command::CommandKeywords;
use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// External agent invocation.
    pub agent: AgentConfig,
    /// Control keywords intercepted before the agent sees the text.
    pub commands: CommandKeywords,
    /// Short acknowledgement texts.
    pub replies: RepliesConfig,
    /// Voice input (external wake-word/VAD helper).
    pub voice: VoiceConfig,
    /// Keyboard input.
    pub keyboard: KeyboardConfig,
    /// Speech-to-text settings.
    pub stt: SttConfig,
    /// Text-to-speech settings.
    pub tts: TtsConfig,
    /// Matrix chat bridge.
    pub chat: ChatConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Liveness indicator while the agent is working.
    pub thinking: ThinkingConfig,
}

/// External agent invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable.
    pub program: String,
    /// Arguments passed on every call, before the continuity arguments.
    pub args: Vec<String>,
    /// Directory the agent runs in (the notes folder).
    pub working_directory: PathBuf,
    /// Inline system prompt. Takes precedence over `system_prompt_path`.
    pub system_prompt: Option<String>,
    /// File holding the system prompt.
    pub system_prompt_path: Option<PathBuf>,
    /// Flag that introduces the system prompt on a fresh call.
    pub system_prompt_flag: String,
    /// Arguments that continue the conversation of this process lifetime.
    pub continue_args: Vec<String>,
    /// Arguments that resume the conversation of a previous process lifetime.
    pub resume_args: Vec<String>,
    /// Maximum seconds to wait for one reply.
    pub timeout_secs: u64,
    /// Environment variables removed before spawning the agent.
    pub strip_env: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_owned(),
            args: vec![
                "--print".to_owned(),
                "--dangerously-skip-permissions".to_owned(),
            ],
            working_directory: PathBuf::from("."),
            system_prompt: None,
            system_prompt_path: None,
            system_prompt_flag: "--system-prompt".to_owned(),
            continue_args: vec!["--continue".to_owned()],
            resume_args: vec!["--continue".to_owned()],
            timeout_secs: 120,
            strip_env: vec!["CLAUDECODE".to_owned()],
        }
    }
}

impl AgentConfig {
    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the system prompt: inline text first, then the prompt file.
    ///
    /// A configured but missing prompt file yields `None`, matching a
    /// deployment that simply has no prompt yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt file exists but cannot be read.
    pub fn effective_system_prompt(&self) -> Result<Option<String>> {
        if let Some(prompt) = self.system_prompt.as_deref() {
            let prompt = prompt.trim();
            return Ok((!prompt.is_empty()).then(|| prompt.to_owned()));
        }
        let Some(path) = self.system_prompt_path.as_deref() else {
            return Ok(None);
        };
        if !path.exists() {
            tracing::warn!(path = %path.display(), "system prompt file not found");
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_owned()))
    }
}

/// Acknowledgement texts produced by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepliesConfig {
    /// After a cancel command.
    pub cancelled: String,
    /// After a session reset.
    pub reset: String,
    /// Before a process restart.
    pub restart: String,
    /// When the agent exceeded its timeout.
    pub timeout: String,
    /// When the agent failed for any other reason.
    pub failure: String,
    /// When speech could not be transcribed.
    pub transcription_failed: String,
    /// Prefix for transcripts quoted back to the chat room.
    pub transcript_prefix: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            cancelled: "Okay, cancelled.".to_owned(),
            reset: "Starting a new conversation.".to_owned(),
            restart: "Restarting now.".to_owned(),
            timeout: "Sorry, that took too long.".to_owned(),
            failure: "Sorry, something went wrong.".to_owned(),
            transcription_failed: "Sorry, I could not understand that.".to_owned(),
            transcript_prefix: "> Transcript: ".to_owned(),
        }
    }
}

/// Voice input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether the voice producer runs.
    pub enabled: bool,
    /// Helper process that performs wake-word detection and VAD capture and
    /// writes length-prefixed PCM utterances to stdout.
    pub capture_command: Vec<String>,
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Capture channel count.
    pub channels: u16,
    /// Captures shorter than this are dropped.
    pub min_capture_ms: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capture_command: Vec::new(),
            sample_rate: 16_000,
            channels: 1,
            min_capture_ms: 500,
        }
    }
}

/// Keyboard input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Whether typed input is accepted.
    pub enabled: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// Transcription model.
    pub model: String,
    /// ISO-639-1 language hint.
    pub language: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Known hallucination phrases removed from transcripts (case-insensitive).
    pub filter_phrases: Vec<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_owned(),
            model: "whisper-1".to_owned(),
            language: "de".to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            timeout_secs: 60,
            filter_phrases: vec![
                "Untertitel im Auftrag des ZDF".to_owned(),
                "Untertitel der Amara.org-Community".to_owned(),
                "Vielen Dank fürs Zuschauen".to_owned(),
            ],
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Whether voice replies are spoken.
    pub enabled: bool,
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// Speech model.
    pub model: String,
    /// Voice name.
    pub voice: String,
    /// Speech speed multiplier.
    pub speed: f32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// PCM sample rate returned by the API.
    pub sample_rate: u32,
    /// Player fed raw s16le mono PCM on stdin. `{rate}` is substituted.
    pub player_command: Vec<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.openai.com/v1".to_owned(),
            model: "tts-1".to_owned(),
            voice: "onyx".to_owned(),
            speed: 1.0,
            api_key_env: "OPENAI_API_KEY".to_owned(),
            timeout_secs: 60,
            sample_rate: 24_000,
            player_command: [
                "aplay", "-q", "-t", "raw", "-f", "S16_LE", "-c", "1", "-r", "{rate}",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

/// Matrix chat bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the chat bridge runs.
    pub enabled: bool,
    /// Homeserver base URL (e.g. `https://matrix.org`).
    pub homeserver: String,
    /// The assistant's own Matrix user ID.
    pub user_id: String,
    /// The single room the assistant listens and replies in.
    pub room_id: String,
    /// Senders allowed to talk to the assistant.
    pub allowed_users: Vec<String>,
    /// Pre-issued access token (falls back to `MATRIX_ACCESS_TOKEN`).
    pub access_token: Option<String>,
    /// Password for login (falls back to `MATRIX_PASSWORD`).
    pub password: Option<String>,
    /// Device display name used on password login.
    pub device_name: String,
    /// Largest accepted voice note.
    pub max_audio_bytes: u64,
    /// Long-poll timeout for `/sync`.
    pub sync_timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            homeserver: String::new(),
            user_id: String::new(),
            room_id: String::new(),
            allowed_users: Vec::new(),
            access_token: None,
            password: None,
            device_name: "JARVIS".to_owned(),
            max_audio_bytes: 25 * 1024 * 1024,
            sync_timeout_ms: 30_000,
        }
    }
}

/// How the chat bridge authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCredentials {
    /// Use an existing access token.
    AccessToken(String),
    /// Log in with a password.
    Password(String),
}

impl ChatConfig {
    /// Resolve credentials from config, then from the environment.
    ///
    /// An access token wins over a password.
    #[must_use]
    pub fn credentials(&self) -> Option<ChatCredentials> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty(self.access_token.clone())
            .or_else(|| non_empty(std::env::var("MATRIX_ACCESS_TOKEN").ok()))
        {
            return Some(ChatCredentials::AccessToken(token));
        }
        non_empty(self.password.clone())
            .or_else(|| non_empty(std::env::var("MATRIX_PASSWORD").ok()))
            .map(ChatCredentials::Password)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file. When unset, logs go to stderr.
    pub file: Option<PathBuf>,
    /// Default filter directive when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            filter: "jarvis=info".to_owned(),
        }
    }
}

/// Liveness indicator while the agent works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThinkingConfig {
    /// Seconds between indicator ticks. 0 disables the indicator.
    pub interval_secs: u64,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// Path-like values have a leading `~` expanded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: Self =
            toml::from_str(&content).map_err(|e| AssistantError::Config(e.to_string()))?;
        config.expand_paths();
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/jarvis/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("jarvis").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("jarvis")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/jarvis-config/config.toml")
        }
    }

    /// Check for problems that make startup impossible.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] describing the first blocking problem.
    pub fn validate(&self) -> Result<()> {
        if self.agent.program.trim().is_empty() {
            return Err(AssistantError::Config("agent.program is empty".to_owned()));
        }
        if self.agent.timeout_secs == 0 {
            return Err(AssistantError::Config(
                "agent.timeout_secs must be greater than zero".to_owned(),
            ));
        }
        if self.voice.enabled && self.voice.capture_command.is_empty() {
            return Err(AssistantError::Config(
                "voice is enabled but voice.capture_command is empty".to_owned(),
            ));
        }
        if self.tts.enabled && self.tts.player_command.is_empty() {
            return Err(AssistantError::Config(
                "tts is enabled but tts.player_command is empty".to_owned(),
            ));
        }
        if self.chat.enabled {
            for (name, value) in [
                ("chat.homeserver", &self.chat.homeserver),
                ("chat.user_id", &self.chat.user_id),
                ("chat.room_id", &self.chat.room_id),
            ] {
                if value.trim().is_empty() {
                    return Err(AssistantError::Config(format!(
                        "chat is enabled but {name} is empty"
                    )));
                }
            }
            if self.chat.credentials().is_none() {
                return Err(AssistantError::Config(
                    "chat is enabled but neither access_token/MATRIX_ACCESS_TOKEN nor \
                     password/MATRIX_PASSWORD is set"
                        .to_owned(),
                ));
            }
            if self.chat.allowed_users.is_empty() {
                tracing::warn!("chat allow-list is empty; all inbound messages will be ignored");
            }
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.agent.working_directory = expand_home(&self.agent.working_directory);
        self.agent.system_prompt_path = self.agent.system_prompt_path.as_deref().map(expand_home);
        self.logging.file = self.logging.file.as_deref().map(expand_home);
    }
}

/// Expand a leading `~` to `$HOME`.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AssistantConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.program, "claude");
        assert!(config.agent.args.contains(&"--print".to_owned()));
        assert_eq!(config.agent.timeout(), Duration::from_secs(120));
        assert!(!config.commands.cancel.is_empty());
        assert_ne!(config.replies.timeout, config.replies.failure);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AssistantConfig::default();
        config.agent.timeout_secs = 45;
        config.chat.allowed_users = vec!["@me:example.org".to_owned()];
        config.replies.cancelled = "Abgebrochen.".to_owned();

        config.save_to_file(&path).unwrap();
        let loaded = AssistantConfig::from_file(&path).unwrap();
        assert_eq!(loaded.agent.timeout_secs, 45);
        assert_eq!(loaded.chat.allowed_users, vec!["@me:example.org"]);
        assert_eq!(loaded.replies.cancelled, "Abgebrochen.");
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent]\ntimeout_secs = 5\n").unwrap();

        let config = AssistantConfig::from_file(&path).unwrap();
        assert_eq!(config.agent.timeout_secs, 5);
        assert_eq!(config.agent.program, "claude");
        assert_eq!(config.tts.voice, "onyx");
    }

    #[test]
    fn from_file_nonexistent_returns_config_error() {
        let result = AssistantConfig::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(AssistantError::Config(_))));
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            AssistantConfig::from_file(&path),
            Err(AssistantError::Config(_))
        ));
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = AssistantConfig::default_config_path();
        let path_str = path.to_string_lossy();
        assert!(path_str.ends_with("config.toml"));
        assert!(path_str.contains("jarvis"));
    }

    #[test]
    fn expand_home_replaces_tilde_only_at_start() {
        if let Some(home) = std::env::var_os("HOME") {
            let expanded = expand_home(Path::new("~/notes"));
            assert_eq!(expanded, PathBuf::from(home).join("notes"));
        }
        assert_eq!(expand_home(Path::new("/a/~b")), PathBuf::from("/a/~b"));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = AssistantConfig::default();
        config.agent.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(AssistantError::Config(_))));
    }

    #[test]
    fn validate_rejects_voice_without_capture_command() {
        let mut config = AssistantConfig::default();
        config.voice.enabled = true;
        assert!(config.validate().is_err());
        config.voice.capture_command = vec!["wake-helper".to_owned()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_chat_without_room() {
        let mut config = AssistantConfig::default();
        config.chat.enabled = true;
        config.chat.homeserver = "https://matrix.example.org".to_owned();
        config.chat.user_id = "@jarvis:example.org".to_owned();
        config.chat.access_token = Some("token".to_owned());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chat.room_id"));
    }

    #[test]
    fn access_token_wins_over_password() {
        let config = ChatConfig {
            access_token: Some("tok".to_owned()),
            password: Some("pw".to_owned()),
            ..ChatConfig::default()
        };
        assert_eq!(
            config.credentials(),
            Some(ChatCredentials::AccessToken("tok".to_owned()))
        );
    }

    #[test]
    fn inline_system_prompt_is_trimmed() {
        let config = AgentConfig {
            system_prompt: Some("  be brief \n".to_owned()),
            ..AgentConfig::default()
        };
        assert_eq!(
            config.effective_system_prompt().unwrap().as_deref(),
            Some("be brief")
        );
    }

    #[test]
    fn system_prompt_loaded_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.md");
        std::fs::write(&path, "You are Jarvis.\n").unwrap();
        let config = AgentConfig {
            system_prompt_path: Some(path),
            ..AgentConfig::default()
        };
        assert_eq!(
            config.effective_system_prompt().unwrap().as_deref(),
            Some("You are Jarvis.")
        );
    }

    #[test]
    fn missing_system_prompt_file_is_none() {
        let config = AgentConfig {
            system_prompt_path: Some(PathBuf::from("/nonexistent/system.md")),
            ..AgentConfig::default()
        };
        assert_eq!(config.effective_system_prompt().unwrap(), None);
    }
}
