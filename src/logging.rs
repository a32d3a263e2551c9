//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.filter`. With `config.file` set, output goes
/// to that file through a background writer; keep the returned guard alive
/// until exit so buffered lines are flushed. Otherwise logs go to stderr so
/// they do not interleave with replies on stdout.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let Some(path) = config.file.as_deref() else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        return None;
    };

    let (writer, guard) = file_writer(path);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}

/// Background writer appending to `path`.
///
/// Lines are written by a worker thread; dropping the guard flushes them.
/// `exec` skips destructors, so the guard must be dropped before a restart.
pub fn file_writer(path: &Path) -> (NonBlocking, WorkerGuard) {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map_or_else(|| "jarvis.log".into(), |n| n.to_os_string());
    if let Err(e) = std::fs::create_dir_all(directory) {
        eprintln!("cannot create log directory {}: {e}", directory.display());
    }
    tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
}
