//! Input producers.
//!
//! Each producer runs on its own thread and pushes finished inputs into the
//! inbox. Producers also look for cancel phrases before enqueueing so that a
//! running agent call can be killed without waiting for the worker. Voice
//! does this by transcribing on its own thread while a call is running.

pub mod keyboard;
pub mod voice;

use crate::agent::CancelHandle;
use crate::command::{self, CommandKeywords, ControlIntent};

/// Kills the in-flight agent call as soon as a cancel phrase is seen.
#[derive(Debug, Clone)]
pub struct EarlyCancel {
    keywords: CommandKeywords,
    handle: CancelHandle,
}

impl EarlyCancel {
    /// Watch for `keywords.cancel` and cancel through `handle`.
    #[must_use]
    pub fn new(keywords: CommandKeywords, handle: CancelHandle) -> Self {
        Self { keywords, handle }
    }

    /// Whether an agent call is running right now.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.handle.is_busy()
    }

    /// Cancel the in-flight call if `text` is a cancel command.
    ///
    /// Returns `true` if a running call was killed. The caller still
    /// enqueues the text so the worker acknowledges it in order.
    pub fn inspect(&self, text: &str) -> bool {
        if command::classify(text, &self.keywords) != ControlIntent::Cancel {
            return false;
        }
        let killed = self.handle.cancel();
        if killed {
            tracing::info!("in-flight agent call cancelled by user");
        }
        killed
    }
}
