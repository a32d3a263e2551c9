//! Liveness indicator while the agent is working.
//!
//! A timer thread calls every registered [`Heartbeat`] once per interval
//! until the returned [`ThinkingGuard`] is dropped.

use crate::pipeline::messages::MessageSource;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Receives periodic "still working" pulses.
pub trait Heartbeat: Send + Sync {
    /// Called once per interval with the time spent so far.
    fn pulse(&self, source: MessageSource, elapsed: Duration);
}

/// Starts a timer thread per agent call.
#[derive(Clone)]
pub struct ThinkingIndicator {
    interval: Duration,
    heartbeats: Vec<Arc<dyn Heartbeat>>,
}

impl ThinkingIndicator {
    /// Indicator firing every `interval`. A zero interval disables it.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            heartbeats: Vec::new(),
        }
    }

    /// Register a receiver.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: Arc<dyn Heartbeat>) -> Self {
        self.heartbeats.push(heartbeat);
        self
    }

    /// Start pulsing for a message from `source`.
    pub fn start(&self, source: MessageSource) -> ThinkingGuard {
        if self.interval.is_zero() || self.heartbeats.is_empty() {
            return ThinkingGuard {
                stop: None,
                handle: None,
            };
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let interval = self.interval;
        let heartbeats = self.heartbeats.clone();
        let spawned = std::thread::Builder::new()
            .name("jarvis-thinking".to_owned())
            .spawn(move || {
                let started = Instant::now();
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let elapsed = started.elapsed();
                            for heartbeat in &heartbeats {
                                heartbeat.pulse(source, elapsed);
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });
        match spawned {
            Ok(handle) => ThinkingGuard {
                stop: Some(stop_tx),
                handle: Some(handle),
            },
            Err(e) => {
                tracing::warn!("failed to start thinking indicator: {e}");
                ThinkingGuard {
                    stop: None,
                    handle: None,
                }
            }
        }
    }
}

/// Stops the indicator when dropped.
pub struct ThinkingGuard {
    stop: Option<crossbeam_channel::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for ThinkingGuard {
    fn drop(&mut self) {
        // Dropping the sender disconnects the timer's receiver.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
