//! Conversation continuity across calls to the external agent.
//!
//! Each turn is a separate agent process. The session decides which
//! continuity flag a call carries:
//!
//! - first call of a `--fresh` start: fresh, with the system prompt
//! - first call after a normal start: resume the previous conversation,
//!   falling back once to a fresh call if the resume fails
//! - any later call: continue
//!
//! A reset goes back to "fresh" without touching the process state.

use super::process::{self, InFlight};
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::pipeline::messages::preview;
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

/// Continuity flag chosen for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
    /// New conversation; carries the system prompt.
    Fresh,
    /// Continue the conversation started during this run.
    Continue,
    /// Pick up the conversation of a previous run.
    Resume,
}

/// The agent seam used by the worker.
pub trait AgentClient: Send {
    /// Send one user message and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on timeout, non-zero exit, empty output,
    /// spawn failure or cancellation.
    fn ask(&mut self, message: &str) -> std::result::Result<String, AgentError>;

    /// Forget the conversation; the next call starts fresh.
    fn reset_session(&mut self);
}

/// Kills the in-flight agent call from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    in_flight: Arc<InFlight>,
}

impl CancelHandle {
    /// A handle that is not attached to any session. `cancel()` does nothing.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Kill the in-flight call. No-op when nothing is running.
    ///
    /// Returns `true` if a process was killed.
    pub fn cancel(&self) -> bool {
        self.in_flight.kill()
    }

    /// Whether an agent call is running right now.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_busy()
    }
}

/// Snapshot of the continuity state, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    /// A call has succeeded since start or the last reset.
    pub started: bool,
    /// The next call should try to resume a previous run's conversation.
    pub resume_pending: bool,
}

/// Stateful client for the external agent CLI.
#[derive(Debug)]
pub struct AgentSession {
    config: AgentConfig,
    system_prompt: Option<String>,
    started: bool,
    resume_pending: bool,
    in_flight: Arc<InFlight>,
}

impl AgentSession {
    /// Create a session.
    ///
    /// With `resume` the first call tries to pick up the previous
    /// conversation; without it the first call is fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured system prompt file cannot be read.
    pub fn new(config: AgentConfig, resume: bool) -> Result<Self> {
        let system_prompt = config.effective_system_prompt()?;
        tracing::info!(
            program = %config.program,
            cwd = %config.working_directory.display(),
            resume,
            has_system_prompt = system_prompt.is_some(),
            "agent session created"
        );
        Ok(Self {
            config,
            system_prompt,
            started: false,
            resume_pending: resume,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Handle for killing the in-flight call from another thread.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Kill the in-flight call, if any.
    pub fn cancel(&self) -> bool {
        self.in_flight.kill()
    }

    /// Current continuity state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState {
            started: self.started,
            resume_pending: self.resume_pending,
        }
    }

    /// The continuity flag the next call will use.
    #[must_use]
    pub fn next_continuity(&self) -> Continuity {
        if self.started {
            Continuity::Continue
        } else if self.resume_pending {
            Continuity::Resume
        } else {
            Continuity::Fresh
        }
    }

    /// Build the command line for one call.
    #[must_use]
    pub fn build_command(&self, continuity: Continuity, message: &str) -> Command {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);
        match continuity {
            Continuity::Fresh => {
                if let Some(prompt) = &self.system_prompt {
                    command.arg(&self.config.system_prompt_flag).arg(prompt);
                }
            }
            Continuity::Continue => {
                command.args(&self.config.continue_args);
            }
            Continuity::Resume => {
                command.args(&self.config.resume_args);
            }
        }
        command.arg(message);
        command.current_dir(&self.config.working_directory);
        for name in &self.config.strip_env {
            command.env_remove(name);
        }
        command
    }

    fn call(&self, continuity: Continuity, message: &str) -> std::result::Result<String, AgentError> {
        let started = Instant::now();
        tracing::info!(?continuity, message = %preview(message, 80), "calling agent");

        let command = self.build_command(continuity, message);
        let output = process::run(command, self.config.timeout(), &self.in_flight)?;

        if !output.status.success() {
            let stderr = output.stderr.trim().to_owned();
            tracing::warn!(code = ?output.status.code(), stderr = %preview(&stderr, 200), "agent failed");
            return Err(AgentError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }
        let reply = output.stdout.trim();
        if reply.is_empty() {
            return Err(AgentError::EmptyOutput);
        }
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = reply.chars().count(),
            "agent replied"
        );
        Ok(reply.to_owned())
    }
}

impl AgentClient for AgentSession {
    fn ask(&mut self, message: &str) -> std::result::Result<String, AgentError> {
        let continuity = self.next_continuity();
        let result = match self.call(continuity, message) {
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) if continuity == Continuity::Resume => {
                tracing::warn!("resume failed ({e}); retrying with a fresh session");
                self.resume_pending = false;
                self.call(Continuity::Fresh, message)
            }
            other => other,
        };
        if result.is_ok() {
            self.started = true;
            self.resume_pending = false;
        }
        result
    }

    fn reset_session(&mut self) {
        tracing::info!("agent session reset");
        self.started = false;
        self.resume_pending = false;
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.in_flight.kill();
    }
}
