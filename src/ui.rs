//! Terminal transcript.

use crate::pipeline::messages::MessageSource;
use crate::pipeline::router::Display;
use crate::pipeline::thinking::Heartbeat;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Prints the conversation to a terminal.
///
/// Lines look like `[14:02:11] [You] text (typed)`. Write errors are ignored:
/// a closed stdout must not take the worker down.
pub struct TerminalDisplay {
    name: String,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalDisplay {
    /// Display on stdout, labelling replies with `name`.
    #[must_use]
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::with_writer(name, Box::new(std::io::stdout()))
    }

    /// Display on any writer.
    #[must_use]
    pub fn with_writer(name: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            out: Mutex::new(out),
        }
    }

    fn line(&self, body: &str) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(out, "[{stamp}] {body}");
        let _ = out.flush();
    }
}

fn input_hint(source: MessageSource) -> &'static str {
    match source {
        MessageSource::Voice => "spoken",
        MessageSource::Keyboard => "typed",
        MessageSource::Chat => "chat",
    }
}

impl Display for TerminalDisplay {
    fn user_input(&self, source: MessageSource, text: &str) {
        self.line(&format!("[You] {text} ({})", input_hint(source)));
    }

    fn reply(&self, source: MessageSource, text: &str) {
        match source {
            MessageSource::Chat => self.line(&format!("[{}] (to chat) {text}", self.name)),
            MessageSource::Voice | MessageSource::Keyboard => {
                self.line(&format!("[{}] {text}", self.name));
            }
        }
    }

    fn notice(&self, text: &str) {
        self.line(&format!("[!] {text}"));
    }
}

impl Heartbeat for TerminalDisplay {
    fn pulse(&self, _source: MessageSource, elapsed: Duration) {
        self.line(&format!("[{}] still thinking ({}s)", self.name, elapsed.as_secs()));
    }
}
