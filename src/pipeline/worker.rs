//! The single sequential consumer of the inbox.
//!
//! Per message: transcribe audio, filter, drop empty text, classify, handle
//! control intents locally or ask the agent, then route the reply by source.
//! Every per-message failure ends in an acknowledgement to the user; nothing
//! a single message does can stop the loop.

use crate::agent::AgentClient;
use crate::command::{self, CommandKeywords, ControlIntent};
use crate::config::RepliesConfig;
use crate::error::{AgentError, AssistantError, Result};
use crate::pipeline::inbox::{Inbox, Received, ShutdownListener};
use crate::pipeline::messages::{AssistantMessage, MessageContent, MessageSource, preview};
use crate::pipeline::router::Router;
use crate::pipeline::thinking::ThinkingIndicator;
use crate::stt::{Transcriber, TranscriptFilter};
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Why the worker loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// A restart command was acknowledged; the process should relaunch.
    Restart,
    /// Shutdown was requested.
    Shutdown,
    /// Every producer has gone away and the queue is drained.
    Disconnected,
}

/// Drives messages through transcription, classification, the agent, and
/// the router.
pub struct Worker {
    agent: Box<dyn AgentClient>,
    transcriber: Option<Box<dyn Transcriber>>,
    filter: Option<Box<dyn TranscriptFilter>>,
    keywords: CommandKeywords,
    replies: RepliesConfig,
    router: Router,
    thinking: ThinkingIndicator,
}

impl Worker {
    /// Worker without speech-to-text, filter, or thinking indicator.
    pub fn new(
        agent: Box<dyn AgentClient>,
        router: Router,
        keywords: CommandKeywords,
        replies: RepliesConfig,
    ) -> Self {
        Self {
            agent,
            transcriber: None,
            filter: None,
            keywords,
            replies,
            router,
            thinking: ThinkingIndicator::new(Duration::ZERO),
        }
    }

    /// Attach the transcriber used for audio messages.
    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Box<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Attach the transcript filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Box<dyn TranscriptFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Attach the liveness indicator shown while the agent works.
    #[must_use]
    pub fn with_thinking(mut self, thinking: ThinkingIndicator) -> Self {
        self.thinking = thinking;
        self
    }

    /// Consume messages until restart, shutdown, or disconnect.
    pub fn run(&mut self, inbox: &Inbox, shutdown: &ShutdownListener) -> WorkerExit {
        tracing::info!("worker started");
        loop {
            match inbox.recv_or_shutdown(shutdown) {
                Received::Message(message) => {
                    if let ControlFlow::Break(exit) = self.handle_guarded(message) {
                        tracing::info!(?exit, pending = inbox.pending(), "worker stopping");
                        return exit;
                    }
                }
                Received::Shutdown => {
                    tracing::info!(pending = inbox.pending(), "worker shutdown requested");
                    return WorkerExit::Shutdown;
                }
                Received::Disconnected => {
                    tracing::info!("all producers gone; worker stopping");
                    return WorkerExit::Disconnected;
                }
            }
        }
    }

    /// Process one message, containing panics from adapters.
    fn handle_guarded(&mut self, message: AssistantMessage) -> ControlFlow<WorkerExit> {
        let source = message.source();
        let channel = message.channel_ref().cloned();
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.handle(&message))) {
            Ok(flow) => flow,
            Err(_) => {
                tracing::error!(%source, "message handling panicked");
                let reported = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    self.router
                        .route(source, channel.as_ref(), &self.replies.failure);
                }));
                if reported.is_err() {
                    tracing::error!(%source, "failure reply panicked; falling back to chime");
                    self.router.chime();
                }
                ControlFlow::Continue(())
            }
        }
    }

    /// Process one message.
    pub fn handle(&mut self, message: &AssistantMessage) -> ControlFlow<WorkerExit> {
        let source = message.source();
        let channel = message.channel_ref();
        let queued_ms = message.created_at().elapsed().as_millis() as u64;
        tracing::debug!(%source, queued_ms, "processing message");

        let raw = match self.text_of(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%source, "transcription failed: {e}");
                self.router
                    .route(source, channel, &self.replies.transcription_failed);
                return ControlFlow::Continue(());
            }
        };
        let text = match &self.filter {
            Some(filter) => filter.filter(&raw),
            None => raw.trim().to_owned(),
        };
        if text.is_empty() {
            tracing::debug!(%source, "empty input dropped");
            return ControlFlow::Continue(());
        }

        self.router.display().user_input(source, &text);
        if source == MessageSource::Chat && matches!(message.content(), MessageContent::Audio(_)) {
            let quote = format!("{}{text}", self.replies.transcript_prefix);
            self.router.quote_to_chat(channel, &quote);
        }

        match command::classify(&text, &self.keywords) {
            ControlIntent::Cancel => {
                tracing::info!(%source, "cancel acknowledged");
                self.router.route(source, channel, &self.replies.cancelled);
                ControlFlow::Continue(())
            }
            ControlIntent::Reset => {
                self.agent.reset_session();
                self.router.route(source, channel, &self.replies.reset);
                ControlFlow::Continue(())
            }
            ControlIntent::Restart => {
                tracing::info!(%source, "restart requested");
                self.router.route(source, channel, &self.replies.restart);
                ControlFlow::Break(WorkerExit::Restart)
            }
            ControlIntent::None => {
                self.ask(source, message, &text);
                ControlFlow::Continue(())
            }
        }
    }

    fn ask(&mut self, source: MessageSource, message: &AssistantMessage, text: &str) {
        let channel = message.channel_ref();
        let started = Instant::now();
        let result = {
            let _thinking = self.thinking.start(source);
            self.agent.ask(text)
        };
        match result {
            Ok(reply) => {
                tracing::info!(
                    %source,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    reply = %preview(&reply, 80),
                    "routing reply"
                );
                self.router.route(source, channel, &reply);
            }
            Err(AgentError::Cancelled) => {
                tracing::info!(%source, "agent call cancelled; no reply");
            }
            Err(e @ AgentError::Timeout(_)) => {
                tracing::error!(%source, "{e}");
                self.router.route(source, channel, &self.replies.timeout);
            }
            Err(e) => {
                tracing::error!(%source, "{e}");
                self.router.route(source, channel, &self.replies.failure);
            }
        }
    }

    fn text_of(&self, message: &AssistantMessage) -> Result<String> {
        match message.content() {
            MessageContent::Text(text) => Ok(text.clone()),
            MessageContent::Audio(audio) => {
                let transcriber = self.transcriber.as_ref().ok_or_else(|| {
                    AssistantError::Transcription("speech-to-text is not configured".to_owned())
                })?;
                transcriber.transcribe(audio)
            }
        }
    }
}
