//! Multi-line keyboard input.
//!
//! Non-empty lines accumulate; an empty line submits them as one message.
//! A line consisting only of ESC discards what was typed so far.

use super::EarlyCancel;
use crate::pipeline::inbox::InboxSender;
use crate::pipeline::messages::AssistantMessage;
use std::io::BufRead;
use std::thread::JoinHandle;

const ESC: &str = "\x1b";

/// Outcome of feeding one line to a [`LineComposer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// The line was buffered.
    Pending,
    /// The buffered lines form a message.
    Submit(String),
    /// The buffer was discarded with ESC.
    Discarded,
    /// An empty line with nothing buffered.
    Empty,
}

/// Accumulates lines into submissions.
#[derive(Debug, Default)]
pub struct LineComposer {
    lines: Vec<String>,
}

impl LineComposer {
    /// Feed one line without its terminator.
    pub fn push(&mut self, line: &str) -> LineEvent {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == ESC {
            self.lines.clear();
            return LineEvent::Discarded;
        }
        if line.trim().is_empty() {
            let text = self.lines.join("\n").trim().to_owned();
            self.lines.clear();
            return if text.is_empty() {
                LineEvent::Empty
            } else {
                LineEvent::Submit(text)
            };
        }
        self.lines.push(line.to_owned());
        LineEvent::Pending
    }

    /// Whether lines are buffered.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.lines.is_empty()
    }
}

/// Read `reader` until end of input, enqueueing each submission.
///
/// Returns when input ends or the inbox is closed. Unsubmitted lines at end
/// of input are dropped.
pub fn read_loop<R: BufRead>(reader: R, inbox: &InboxSender, early_cancel: Option<&EarlyCancel>) {
    let mut composer = LineComposer::default();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("keyboard read failed: {e}");
                break;
            }
        };
        match composer.push(&line) {
            LineEvent::Submit(text) => {
                if let Some(early) = early_cancel {
                    early.inspect(&text);
                }
                if inbox.send(AssistantMessage::keyboard(text)).is_err() {
                    tracing::debug!("inbox closed; keyboard producer stopping");
                    return;
                }
            }
            LineEvent::Discarded => tracing::debug!("keyboard input discarded"),
            LineEvent::Pending | LineEvent::Empty => {}
        }
    }
    if composer.is_pending() {
        tracing::debug!("unsubmitted keyboard input dropped at end of input");
    }
    tracing::info!("keyboard input closed");
}

/// Start the keyboard producer on stdin.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn(inbox: InboxSender, early_cancel: EarlyCancel) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("jarvis-keyboard".to_owned())
        .spawn(move || {
            let stdin = std::io::stdin();
            read_loop(stdin.lock(), &inbox, Some(&early_cancel));
        })
}
