//! Structured logging setup with console and file output.
//!
//! Provides:
//! - Daily rotating log files
//! - Build-type conditional log levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via NLQ_LOG or RUST_LOG

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable consulted before RUST_LOG.
pub const LOG_ENV: &str = "NLQ_LOG";

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether running in a PTY (affects output formatting)
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the process.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If file logging initialization fails, falls back to console-only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_pty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

/// Initialize with defaults (convenience function).
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn init_stdout_logging(filter: Option<&str>) -> LoggingGuard {
    let env_filter = build_env_filter(filter);

    // stderr keeps stdout clean for JSON output from the CLI
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(
    config: &LogConfig,
) -> Result<WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("nlq")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);
    let combined = stderr.and(non_blocking);

    let env_filter = build_env_filter(config.log_filter.as_deref());

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()?;

    Ok(guard)
}

/// Build the environment filter from config or defaults.
///
/// Priority: custom filter > NLQ_LOG > RUST_LOG > default.
pub fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "info,nlq=debug,nlq_core=debug,tokio_postgres=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "warn,nlq=info,nlq_core=info,tokio_postgres=warn"
    }
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("nlq").join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_namespaced() {
        let dir = log_dir();
        assert!(dir.ends_with("nlq/logs"));
    }

    #[test]
    fn test_file_logging_reports_unusable_directory() {
        fn assert_send_sync<T: Send + Sync + ?Sized>(_: &T) {}

        let file = tempfile::NamedTempFile::new().unwrap();
        let config = LogConfig::new(file.path().join("logs"));
        let err = init_file_logging(&config).unwrap_err();
        assert_send_sync(&*err);
        assert!(!config.log_dir.exists());
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::new(dir.path().join("nested").join("logs"));
        // the global subscriber may already be set by another test
        let _ = init_file_logging(&config);
        assert!(config.log_dir.is_dir());
    }

    #[test]
    fn test_default_filter_covers_core_crate() {
        assert!(default_log_filter().contains("nlq_core="));
        assert!(default_log_filter().contains("tokio_postgres=warn"));
    }
}
