//! Process self-restart.
//!
//! A restart replaces the running process with a fresh copy of itself. The
//! new process resumes the agent conversation, so `--fresh` is dropped from
//! the argument list.

use crate::error::{AssistantError, Result};
use tracing_appender::non_blocking::WorkerGuard;

/// Flag that forces a new agent conversation at startup.
pub const FRESH_FLAG: &str = "--fresh";

/// Arguments for the relaunched process, without the program name.
#[must_use]
pub fn relaunch_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .filter(|arg| arg != FRESH_FLAG)
        .collect()
}

/// Replace the current process with a new instance.
///
/// `log_guard` is dropped right before the exec so buffered file logs,
/// including the restart line, reach disk. Only returns on failure.
///
/// # Errors
///
/// Returns [`AssistantError::Io`] if the executable cannot be located or
/// started.
pub fn exec(log_guard: Option<WorkerGuard>) -> Result<std::convert::Infallible> {
    let program = std::env::current_exe()?;
    let args = relaunch_args(std::env::args().skip(1));
    tracing::info!(program = %program.display(), ?args, "restarting");
    drop(log_guard);

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new(&program).args(&args).exec();
        Err(AssistantError::Io(err))
    }

    #[cfg(not(unix))]
    {
        std::process::Command::new(&program).args(&args).spawn()?;
        std::process::exit(0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn fresh_flag_is_removed() {
        assert_eq!(
            relaunch_args(["--config", "/tmp/c.toml", "--fresh", "--no-voice"]),
            vec!["--config", "/tmp/c.toml", "--no-voice"]
        );
    }

    #[test]
    fn other_arguments_keep_order() {
        assert_eq!(relaunch_args(["-c", "x", "--no-chat"]), vec!["-c", "x", "--no-chat"]);
        assert!(relaunch_args(Vec::<String>::new()).is_empty());
    }
}
