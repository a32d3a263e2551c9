//! Voice producer: forwards finished captures to the inbox.

use super::EarlyCancel;
use crate::audio::capture::CaptureSource;
use crate::config::VoiceConfig;
use crate::pipeline::inbox::InboxSender;
use crate::pipeline::messages::{AssistantMessage, AudioPayload};
use crate::stt::Transcriber;
use std::thread::JoinHandle;

/// Spoken cancel detection while the agent is busy.
///
/// The worker cannot transcribe the next utterance until the running call
/// returns, so the producer transcribes it itself and kills the call when it
/// is a cancel phrase.
pub struct SpokenCancel {
    transcriber: Box<dyn Transcriber>,
    early: EarlyCancel,
}

impl SpokenCancel {
    /// Transcribe with `transcriber` and cancel through `early`.
    #[must_use]
    pub fn new(transcriber: Box<dyn Transcriber>, early: EarlyCancel) -> Self {
        Self { transcriber, early }
    }

    /// Check `audio` for a cancel phrase if a call is in flight.
    ///
    /// Returns `true` if the running call was killed.
    pub fn inspect(&self, audio: &AudioPayload) -> bool {
        if !self.early.is_busy() {
            return false;
        }
        match self.transcriber.transcribe(audio) {
            Ok(text) => self.early.inspect(&text),
            Err(e) => {
                tracing::warn!("cancel check transcription failed: {e}");
                false
            }
        }
    }
}

/// Forward utterances from `capture` until it ends or the inbox closes.
///
/// Captures shorter than `min_capture_ms` are dropped. With `spoken_cancel`
/// each capture is checked for a cancel phrase before it is enqueued; the
/// capture is enqueued either way so the worker acknowledges it in order.
pub fn capture_loop<C: CaptureSource + ?Sized>(
    capture: &mut C,
    inbox: &InboxSender,
    config: &VoiceConfig,
    spoken_cancel: Option<&SpokenCancel>,
) {
    loop {
        let pcm = match capture.next_utterance() {
            Ok(Some(pcm)) => pcm,
            Ok(None) => {
                tracing::info!("voice capture ended");
                return;
            }
            Err(e) => {
                tracing::error!("voice capture failed: {e}");
                return;
            }
        };
        let audio = AudioPayload::pcm16(pcm, config.sample_rate, config.channels);
        let duration_ms = audio.pcm_duration_ms().unwrap_or_default();
        if duration_ms < u64::from(config.min_capture_ms) {
            tracing::debug!(duration_ms, "capture too short, dropped");
            continue;
        }
        tracing::info!(duration_ms, "voice capture finished");
        if let Some(spoken) = spoken_cancel {
            spoken.inspect(&audio);
        }
        if inbox.send(AssistantMessage::voice(audio)).is_err() {
            tracing::debug!("inbox closed; voice producer stopping");
            return;
        }
    }
}

/// Start the voice producer on its own thread.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn(
    mut capture: Box<dyn CaptureSource>,
    inbox: InboxSender,
    config: VoiceConfig,
    spoken_cancel: Option<SpokenCancel>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("jarvis-voice".to_owned())
        .spawn(move || capture_loop(capture.as_mut(), &inbox, &config, spoken_cancel.as_ref()))
}
