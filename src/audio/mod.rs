//! Audio capture and playback through external helper processes.

pub mod capture;
pub mod playback;

pub use capture::{CaptureSource, CaptureStop, FramedCapture};
pub use playback::{PcmPlayer, ThinkingBeep, ToneChime};
