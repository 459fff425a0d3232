//! Logging setup.
//!
//! The library only emits `tracing` events. Binaries call [`init_logging`]
//! once at startup to install a subscriber: a console layer on stderr and,
//! optionally, a daily-rolling log file.
//!
//! The filter is taken from `RUST_LOG` when set, otherwise from the level
//! passed in.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{CacheError, CacheResult};

/// File name prefix for rolling log files.
pub const LOG_FILE_PREFIX: &str = "contentcache.log";

/// Install the global subscriber.
///
/// # Arguments
///
/// * `default_level` - Filter directive used when `RUST_LOG` is unset
///   (e.g. `"info"` or `"contentcache=debug"`)
/// * `log_dir` - Directory for daily log files, or `None` for console only
///
/// # Returns
///
/// The file writer's guard when `log_dir` is set. Keep it alive until exit
/// or buffered lines are lost.
pub fn init_logging(default_level: &str, log_dir: Option<&Path>) -> CacheResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| CacheError::Logging(e.to_string()))?;

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let registry = tracing_subscriber::registry().with(filter).with(console);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| CacheError::Logging(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| CacheError::Logging(e.to_string()))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_once_with_file_output() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");

        let guard = init_logging("debug", Some(&log_dir)).unwrap();
        assert!(guard.is_some());
        assert!(log_dir.is_dir());
        tracing::info!("logging initialized");

        // The global subscriber can only be installed once per process
        let err = init_logging("info", None).unwrap_err();
        assert!(matches!(err, CacheError::Logging(_)));
    }
}
