//! Logging setup.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a
//! pretty or JSON fmt layer writing to stderr or an append-only file.
//! Backends emit spans and events regardless; nothing is printed until
//! [`init`] runs. Metrics go through the `metrics` facade and are recorded
//! only if the embedding application installs a recorder.

use crate::config::{LogFormat, LoggingSettings};
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Event filter.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the configuration from settings.
    ///
    /// `RUST_LOG` takes precedence over the configured level; `verbose`
    /// raises the configured level to `debug`.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings, verbose: bool) -> Self {
        let level = if verbose { "debug" } else { settings.level.as_str() };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
        });
        Self {
            filter,
            format: settings.format,
            file: settings.file.clone(),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file cannot be opened.
pub fn init(config: LoggingConfig) -> Result<()> {
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (&config.file, config.format) {
        (Some(path), LogFormat::Json) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(open_log_file(path)?)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        (Some(path), LogFormat::Pretty) => tracing_subscriber::fmt::layer()
            .with_writer(open_log_file(path)?)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        (None, LogFormat::Json) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        (None, LogFormat::Pretty) => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(config.filter)
        .try_init()
        .map_err(init_error)
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_from_settings_keeps_format_and_file() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            format: LogFormat::Json,
            file: Some(PathBuf::from("/tmp/auditlog.log")),
        };
        let config = LoggingConfig::from_settings(&settings, true);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file.as_deref(), Some(Path::new("/tmp/auditlog.log")));
    }

    #[test]
    fn test_invalid_level_falls_back() {
        let settings = LoggingSettings {
            level: "[[not a directive".to_string(),
            ..LoggingSettings::default()
        };
        let _ = LoggingConfig::from_settings(&settings, false);
    }

    #[test]
    fn test_log_file_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.log");
        let mut writer = open_log_file(&path).unwrap();
        writer.write_all(b"first\n").unwrap();
        let mut again = open_log_file(&path).unwrap();
        again.write_all(b"second\n").unwrap();
        again.flush().unwrap();

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_init_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LoggingSettings {
            file: Some(dir.path().join("init.log")),
            ..LoggingSettings::default()
        };
        assert!(init(LoggingConfig::from_settings(&settings, false)).is_ok());
        let second = init(LoggingConfig::from_settings(&settings, false));
        assert!(matches!(second, Err(Error::OperationFailed { .. })));
    }
}
