//! Audio playback through an external player process, plus synthesized
//! notification tones.

use crate::error::{AssistantError, Result};
use crate::pipeline::messages::MessageSource;
use crate::pipeline::router::ErrorChime;
use crate::pipeline::thinking::Heartbeat;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Plays raw s16le mono PCM by piping it into a player command.
///
/// `{rate}` in any argument is replaced with the sample rate.
#[derive(Debug, Clone)]
pub struct PcmPlayer {
    command: Vec<String>,
}

impl PcmPlayer {
    /// Create a player.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Config`] if `command` is empty.
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(AssistantError::Config("player command is empty".to_owned()));
        }
        Ok(Self { command })
    }

    /// Arguments for one playback at `sample_rate`.
    #[must_use]
    pub fn command_line(&self, sample_rate: u32) -> Vec<String> {
        let rate = sample_rate.to_string();
        self.command
            .iter()
            .map(|arg| arg.replace("{rate}", &rate))
            .collect()
    }

    /// Play `pcm` and block until the player exits.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Audio`] if the player cannot be started,
    /// closes its input early, or exits unsuccessfully.
    pub fn play(&self, pcm: &[u8], sample_rate: u32) -> Result<()> {
        self.play_from(&mut &pcm[..], sample_rate)
    }

    /// Stream PCM from `source` into the player as it arrives.
    ///
    /// # Errors
    ///
    /// Same as [`PcmPlayer::play`], plus read errors from `source`.
    pub fn play_from<R: Read + ?Sized>(&self, source: &mut R, sample_rate: u32) -> Result<()> {
        let argv = self.command_line(sample_rate);
        let Some((program, args)) = argv.split_first() else {
            return Err(AssistantError::Audio("player command is empty".to_owned()));
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AssistantError::Audio(format!("failed to start player `{program}`: {e}")))?;

        let copied = match child.stdin.take() {
            Some(mut stdin) => std::io::copy(source, &mut stdin),
            None => Ok(0),
        };
        let output = child
            .wait_with_output()
            .map_err(|e| AssistantError::Audio(format!("player `{program}` failed: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AssistantError::Audio(format!(
                "player `{program}` exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let bytes = copied
            .map_err(|e| AssistantError::Audio(format!("failed to feed player `{program}`: {e}")))?;
        tracing::debug!(program = %program, bytes, sample_rate, "playback finished");
        Ok(())
    }
}

/// One segment of a synthesized tone.
#[derive(Debug, Clone, Copy)]
pub struct Tone {
    /// Frequency in Hz.
    pub frequency: f32,
    /// Segment length.
    pub duration: Duration,
    /// Peak amplitude, 0.0..=1.0.
    pub amplitude: f32,
}

/// Descending two-tone error sound (E4 then A3).
pub const ERROR_TONES: [Tone; 2] = [
    Tone {
        frequency: 330.0,
        duration: Duration::from_millis(150),
        amplitude: 0.4,
    },
    Tone {
        frequency: 220.0,
        duration: Duration::from_millis(200),
        amplitude: 0.4,
    },
];

/// Soft short beep while the agent is thinking.
pub const THINKING_TONE: Tone = Tone {
    frequency: 440.0,
    duration: Duration::from_millis(100),
    amplitude: 0.25,
};

/// Render tones to s16le mono PCM with a short fade at both ends of each
/// segment.
#[must_use]
pub fn synthesize(tones: &[Tone], sample_rate: u32) -> Vec<u8> {
    let rate = sample_rate as f32;
    let mut pcm = Vec::new();
    for tone in tones {
        let n = (u128::from(sample_rate) * tone.duration.as_millis() / 1000) as usize;
        let fade = (n / 10).max(1);
        for i in 0..n {
            let t = i as f32 / rate;
            let envelope = if i < fade {
                i as f32 / fade as f32
            } else if i >= n - fade {
                (n - i) as f32 / fade as f32
            } else {
                1.0
            };
            let value = tone.amplitude.clamp(0.0, 1.0)
                * envelope
                * (2.0 * std::f32::consts::PI * tone.frequency * t).sin();
            let sample = (value * f32::from(i16::MAX)).round() as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

/// Error chime played through a [`PcmPlayer`], with the terminal bell as the
/// last resort.
#[derive(Debug, Clone)]
pub struct ToneChime {
    player: Option<PcmPlayer>,
    sample_rate: u32,
}

impl ToneChime {
    /// Chime through `player`. `None` uses the terminal bell only.
    #[must_use]
    pub fn new(player: Option<PcmPlayer>, sample_rate: u32) -> Self {
        Self {
            player,
            sample_rate,
        }
    }
}

impl ErrorChime for ToneChime {
    fn chime(&self) {
        if let Some(player) = &self.player {
            match player.play(&synthesize(&ERROR_TONES, self.sample_rate), self.sample_rate) {
                Ok(()) => return,
                Err(e) => tracing::warn!("error chime failed, using terminal bell: {e}"),
            }
        }
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

/// Beeps on every thinking pulse for voice messages, where the user has no
/// screen to look at.
#[derive(Debug, Clone)]
pub struct ThinkingBeep {
    player: PcmPlayer,
    sample_rate: u32,
}

impl ThinkingBeep {
    /// Beep through `player`.
    #[must_use]
    pub fn new(player: PcmPlayer, sample_rate: u32) -> Self {
        Self {
            player,
            sample_rate,
        }
    }
}

impl Heartbeat for ThinkingBeep {
    fn pulse(&self, source: MessageSource, _elapsed: Duration) {
        if source != MessageSource::Voice {
            return;
        }
        if let Err(e) = self
            .player
            .play(&synthesize(&[THINKING_TONE], self.sample_rate), self.sample_rate)
        {
            tracing::debug!("thinking beep failed: {e}");
        }
    }
}
