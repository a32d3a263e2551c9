//! One-shot agent subprocess with a timeout and out-of-band kill.
//!
//! The child handle lives in a shared [`InFlight`] slot so another thread can
//! kill it while the caller is blocked waiting. The waiting thread polls the
//! child instead of blocking in `wait()`, which keeps the lock free for
//! [`InFlight::kill`].

use crate::error::AgentError;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for the pipe readers after the child has exited.
///
/// Tools started by the agent may inherit stdout/stderr and keep the pipes
/// open after the agent itself is gone.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Shared slot for the single in-flight child process.
#[derive(Debug, Default)]
pub struct InFlight {
    child: Mutex<Option<Child>>,
    cancelled: AtomicBool,
}

impl InFlight {
    /// Whether a child is currently running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock().is_some()
    }

    /// Kill the running child, if any. Returns `true` if a child was killed.
    pub fn kill(&self) -> bool {
        let Some(mut child) = self.lock().take() else {
            return false;
        };
        self.cancelled.store(true, Ordering::SeqCst);
        let pid = child.id();
        if let Err(e) = child.kill() {
            tracing::warn!(pid, "failed to kill agent process: {e}");
        }
        let _ = child.wait();
        tracing::info!(pid, "agent process killed");
        true
    }

    fn lock(&self) -> MutexGuard<'_, Option<Child>> {
        // A poisoned slot still holds a valid `Option<Child>`.
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Captured result of a finished child.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Lossy UTF-8 stdout.
    pub stdout: String,
    /// Lossy UTF-8 stderr.
    pub stderr: String,
}

/// Spawn `command`, park the child in `in_flight`, and wait for it.
///
/// # Errors
///
/// - [`AgentError::Spawn`] if the process cannot be started or polled
/// - [`AgentError::Timeout`] if it runs longer than `timeout` (it is killed)
/// - [`AgentError::Cancelled`] if [`InFlight::kill`] was called meanwhile
pub fn run(
    mut command: Command,
    timeout: Duration,
    in_flight: &Arc<InFlight>,
) -> Result<ProcessOutput, AgentError> {
    let program = command.get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| AgentError::Spawn {
        program: program.clone(),
        source,
    })?;

    let (out_tx, out_rx) = crossbeam_channel::bounded::<(Stream, Vec<u8>)>(2);
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(Stream::Stdout, stdout, out_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_reader(Stream::Stderr, stderr, out_tx);
    }

    in_flight.cancelled.store(false, Ordering::SeqCst);
    *in_flight.lock() = Some(child);

    let started = Instant::now();
    let status = loop {
        {
            let mut slot = in_flight.lock();
            let Some(child) = slot.as_mut() else {
                // Taken by `kill()` from another thread.
                return Err(AgentError::Cancelled);
            };
            match child.try_wait() {
                Ok(Some(status)) => {
                    slot.take();
                    break status;
                }
                Ok(None) => {}
                Err(source) => {
                    if let Some(mut child) = slot.take() {
                        let _ = child.kill();
                        let _ = child.wait();
                    }
                    return Err(AgentError::Spawn { program, source });
                }
            }
            if started.elapsed() >= timeout {
                if let Some(mut child) = slot.take() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                tracing::warn!(timeout_s = timeout.as_secs(), "agent timed out and was killed");
                return Err(AgentError::Timeout(timeout));
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    if in_flight.cancelled.load(Ordering::SeqCst) {
        return Err(AgentError::Cancelled);
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let deadline = Instant::now() + READER_GRACE;
    for _ in 0..2 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match out_rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, bytes)) => stdout = bytes,
            Ok((Stream::Stderr, bytes)) => stderr = bytes,
            Err(_) => {
                tracing::debug!("agent output pipes still open after exit; using partial output");
                break;
            }
        }
    }

    Ok(ProcessOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(stream: Stream, mut pipe: R, tx: crossbeam_channel::Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            tracing::debug!(?stream, "agent pipe read failed: {e}");
        }
        let _ = tx.send((stream, buf));
    });
}
