//! Utterance capture from an external wake-word/VAD helper.
//!
//! The helper listens for the wake word, records until silence, and writes
//! each finished utterance to its stdout as one frame:
//!
//! ```text
//! u32 little-endian byte length | s16le PCM bytes
//! ```

use crate::error::{AssistantError, Result};
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};

/// Upper bound for a single frame (about nine minutes of 16 kHz mono).
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// A source of finished utterances.
pub trait CaptureSource: Send {
    /// Block until the next utterance. `Ok(None)` once the source has ended.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Audio`] on a malformed or truncated frame.
    fn next_utterance(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Frame decoder over any byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next frame. `Ok(None)` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Audio`] on an oversized or truncated frame.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            match self.inner.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(AssistantError::Audio(
                        "capture stream ended inside a frame header".to_owned(),
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(AssistantError::Audio(format!("capture read failed: {e}"))),
            }
        }
        let len = u32::from_le_bytes(header);
        if len > MAX_FRAME_BYTES {
            return Err(AssistantError::Audio(format!(
                "capture frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
            )));
        }
        let mut pcm = vec![0u8; len as usize];
        self.inner.read_exact(&mut pcm).map_err(|e| {
            AssistantError::Audio(format!("capture stream ended inside a frame: {e}"))
        })?;
        Ok(Some(pcm))
    }
}

/// Runs the helper process and decodes its frames.
#[derive(Debug)]
pub struct FramedCapture {
    child: CaptureStop,
    reader: FrameReader<ChildStdout>,
}

/// Stops a running helper from another thread. The capture then reports end
/// of stream.
#[derive(Debug, Clone)]
pub struct CaptureStop {
    child: Arc<Mutex<Child>>,
}

impl CaptureStop {
    /// Kill the helper if it is still running.
    pub fn stop(&self) {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(None) = child.try_wait() {
            tracing::debug!(pid = child.id(), "stopping voice capture helper");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FramedCapture {
    /// Start the helper given as `argv`.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Audio`] if the helper cannot be started.
    pub fn spawn(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(AssistantError::Config("voice.capture_command is empty".to_owned()));
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| AssistantError::Audio(format!("failed to start `{program}`: {e}")))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AssistantError::Audio(format!("`{program}` has no stdout pipe"))
        })?;
        tracing::info!(program = %program, pid = child.id(), "voice capture helper started");
        Ok(Self {
            child: CaptureStop {
                child: Arc::new(Mutex::new(child)),
            },
            reader: FrameReader::new(stdout),
        })
    }

    /// Handle that kills the helper.
    #[must_use]
    pub fn stop_handle(&self) -> CaptureStop {
        self.child.clone()
    }
}

impl CaptureSource for FramedCapture {
    fn next_utterance(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_frame()
    }
}

impl Drop for FramedCapture {
    fn drop(&mut self) {
        self.child.stop();
    }
}
