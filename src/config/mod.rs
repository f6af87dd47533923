//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then a TOML file (explicit
//! path or the default location), then `AUDITLOG_*` environment variables.
//!
//! ```toml
//! page_size = 50
//! content_types = ["shop.Order", "auth.User"]
//!
//! [storage]
//! backend = "sqlite"
//! sqlite_path = "/var/lib/auditlog/audit.db"
//! table = "audit_logs"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! file = "/var/log/auditlog.log"
//! ```

use crate::storage::sql::DEFAULT_TABLE;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application directory name under the platform config and data dirs.
const APP_DIR: &str = "auditlog";

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Storage backend selection.
    pub storage: StorageConfig,
    /// Logging output.
    pub logging: LoggingSettings,
    /// Default page size for listing commands.
    pub page_size: usize,
    /// Content type keys registered at startup.
    pub content_types: Vec<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Which backend to open.
    pub backend: BackendKind,
    /// Database file for the `SQLite` backend.
    pub sqlite_path: PathBuf,
    /// Connection URL for the PostgreSQL backend.
    pub postgres_url: Option<String>,
    /// Table holding entries (SQL backends).
    pub table: String,
    /// Maximum pooled connections (PostgreSQL).
    pub pool_max_size: Option<usize>,
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Process-local storage.
    #[default]
    Memory,
    /// Embedded `SQLite` file.
    Sqlite,
    /// PostgreSQL server (requires the `postgres` feature).
    Postgres,
}

impl BackendKind {
    /// Parses a backend name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(Error::InvalidInput(format!("unknown storage backend '{other}'"))),
        }
    }

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` takes precedence).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!("unknown log format '{other}'"))),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            sqlite_path: default_sqlite_path(),
            postgres_url: None,
            table: DEFAULT_TABLE.to_string(),
            pool_max_size: None,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            logging: LoggingSettings::default(),
            page_size: 20,
            content_types: Vec::new(),
        }
    }
}

/// Returns `<data_dir>/auditlog/audit.db`, or `audit.db` when no home is known.
fn default_sqlite_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("audit.db"),
        |dirs| dirs.data_local_dir().join(APP_DIR).join("audit.db"),
    )
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
    /// Page size.
    pub page_size: Option<usize>,
    /// Content type keys.
    pub content_types: Option<Vec<String>>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileStorage {
    /// Backend name.
    pub backend: Option<String>,
    /// `SQLite` database path.
    pub sqlite_path: Option<String>,
    /// PostgreSQL URL.
    pub postgres_url: Option<String>,
    /// Table name.
    pub table: Option<String>,
    /// Pool size.
    pub pool_max_size: Option<usize>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// Output format.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl AuditConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for the command-line tool.
    ///
    /// Same as [`Self::default`] except that storage goes to the `SQLite`
    /// file, since each CLI invocation is a separate process.
    #[must_use]
    pub fn cli_default() -> Self {
        Self::default().with_backend(BackendKind::Sqlite)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown backend or log format.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::default().merge_file(path)
    }

    /// Applies a configuration file on top of `self`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load_from_file`].
    pub fn merge_file(self, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        self.merge_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Self::default().merge_toml(contents)
    }

    /// Applies TOML text on top of `self`; settings it omits keep their value.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn merge_toml(self, contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        self.merge_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        Self::default().merge_default_file()
    }

    /// Applies the first readable file from the default location on top of `self`.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/auditlog/` on macOS)
    /// 2. XDG config dir (`~/.config/auditlog/` for Unix compatibility)
    #[must_use]
    pub fn merge_default_file(self) -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return self;
        };

        let candidates = [
            base_dirs.config_dir().join(APP_DIR).join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join(APP_DIR)
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match self.clone().merge_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "ignoring unreadable config file"
                    );
                },
            }
        }

        self
    }

    /// Applies a parsed `ConfigFile`.
    fn merge_config_file(self, file: ConfigFile) -> Result<Self> {
        let mut config = self;

        if let Some(storage) = file.storage {
            if let Some(backend) = storage.backend {
                config.storage.backend = BackendKind::parse(&backend)?;
            }
            if let Some(path) = storage.sqlite_path {
                config.storage.sqlite_path = PathBuf::from(path);
            }
            if let Some(table) = storage.table {
                config.storage.table = table;
            }
            if let Some(url) = storage.postgres_url {
                config.storage.postgres_url = Some(url);
            }
            if let Some(size) = storage.pool_max_size {
                config.storage.pool_max_size = Some(size);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format)?;
            }
            if let Some(file) = logging.file {
                config.logging.file = Some(PathBuf::from(file));
            }
        }
        if let Some(page_size) = file.page_size {
            config.page_size = page_size;
        }
        if let Some(content_types) = file.content_types {
            config.content_types = content_types;
        }

        Ok(config)
    }

    /// Applies `AUDITLOG_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an invalid value.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_env_overrides_with(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `AUDITLOG_STORAGE_BACKEND` | `storage.backend` |
    /// | `AUDITLOG_SQLITE_PATH` | `storage.sqlite_path` |
    /// | `AUDITLOG_POSTGRES_URL` | `storage.postgres_url` |
    /// | `AUDITLOG_TABLE` | `storage.table` |
    /// | `AUDITLOG_POOL_MAX_SIZE` | `storage.pool_max_size` |
    /// | `AUDITLOG_LOG_LEVEL` | `logging.level` |
    /// | `AUDITLOG_LOG_FORMAT` | `logging.format` |
    /// | `AUDITLOG_LOG_FILE` | `logging.file` |
    /// | `AUDITLOG_PAGE_SIZE` | `page_size` |
    /// | `AUDITLOG_CONTENT_TYPES` | `content_types` (comma-separated) |
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an invalid value.
    pub fn apply_env_overrides_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AUDITLOG_STORAGE_BACKEND") {
            self.storage.backend = BackendKind::parse(&v)?;
        }
        if let Some(v) = get("AUDITLOG_SQLITE_PATH") {
            self.storage.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = get("AUDITLOG_POSTGRES_URL") {
            self.storage.postgres_url = Some(v);
        }
        if let Some(v) = get("AUDITLOG_TABLE") {
            self.storage.table = v;
        }
        if let Some(v) = get("AUDITLOG_POOL_MAX_SIZE") {
            self.storage.pool_max_size = Some(parse_usize("AUDITLOG_POOL_MAX_SIZE", &v)?);
        }
        if let Some(v) = get("AUDITLOG_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("AUDITLOG_LOG_FORMAT") {
            self.logging.format = LogFormat::parse(&v)?;
        }
        if let Some(v) = get("AUDITLOG_LOG_FILE") {
            self.logging.file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("AUDITLOG_PAGE_SIZE") {
            self.page_size = parse_usize("AUDITLOG_PAGE_SIZE", &v)?;
        }
        if let Some(v) = get("AUDITLOG_CONTENT_TYPES") {
            self.content_types = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(self)
    }

    /// Sets the storage backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.storage.backend = backend;
        self
    }

    /// Sets the `SQLite` database path.
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.sqlite_path = path.into();
        self
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidInput(format!("{key}='{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.table, "audit_logs");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.page_size, 20);
        assert!(config.storage.sqlite_path.ends_with("audit.db"));
    }

    #[test]
    fn test_from_toml() {
        let config = AuditConfig::from_toml(
            r#"
            page_size = 5
            content_types = ["shop.Order"]

            [storage]
            backend = "sqlite"
            sqlite_path = "/tmp/a.db"
            table = "events"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, BackendKind::Sqlite);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("/tmp/a.db"));
        assert_eq!(config.storage.table, "events");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.page_size, 5);
        assert_eq!(config.content_types, ["shop.Order"]);
    }

    #[test]
    fn test_cli_default_persists_unless_configured() {
        let config = AuditConfig::cli_default().merge_toml("page_size = 5").unwrap();
        assert_eq!(config.storage.backend, BackendKind::Sqlite);
        assert_eq!(config.page_size, 5);

        let config = AuditConfig::cli_default()
            .merge_toml("[storage]\nbackend = \"memory\"")
            .unwrap();
        assert_eq!(config.storage.backend, BackendKind::Memory);

        let config = AuditConfig::cli_default()
            .apply_env_overrides_with(env(&[("AUDITLOG_STORAGE_BACKEND", "memory")]))
            .unwrap();
        assert_eq!(config.storage.backend, BackendKind::Memory);
    }

    #[test]
    fn test_from_toml_rejects_unknown_values() {
        assert!(AuditConfig::from_toml("[storage]\nbackend = \"mysql\"").is_err());
        assert!(AuditConfig::from_toml("[storage]\nbogus = 1").is_err());
        assert!(AuditConfig::from_toml("page_size = \"ten\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[storage]\nbackend = \"postgres\"\npostgres_url = \"postgresql://localhost/a\""
        )
        .unwrap();
        let config = AuditConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.storage.backend, BackendKind::Postgres);
        assert_eq!(config.storage.postgres_url.as_deref(), Some("postgresql://localhost/a"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AuditConfig::load_from_file(Path::new("/nonexistent/auditlog.toml"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let config = AuditConfig::default()
            .apply_env_overrides_with(env(&[
                ("AUDITLOG_STORAGE_BACKEND", "SQLite"),
                ("AUDITLOG_SQLITE_PATH", "/data/x.db"),
                ("AUDITLOG_POOL_MAX_SIZE", "8"),
                ("AUDITLOG_LOG_LEVEL", "auditlog=debug"),
                ("AUDITLOG_CONTENT_TYPES", "a.B, c.D,,"),
                ("AUDITLOG_TABLE", "  "),
            ]))
            .unwrap();
        assert_eq!(config.storage.backend, BackendKind::Sqlite);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("/data/x.db"));
        assert_eq!(config.storage.pool_max_size, Some(8));
        assert_eq!(config.logging.level, "auditlog=debug");
        assert_eq!(config.content_types, ["a.B", "c.D"]);
        assert_eq!(config.storage.table, "audit_logs");
    }

    #[test]
    fn test_env_override_errors() {
        let result =
            AuditConfig::default().apply_env_overrides_with(env(&[("AUDITLOG_PAGE_SIZE", "-1")]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        let result =
            AuditConfig::default().apply_env_overrides_with(env(&[("AUDITLOG_LOG_FORMAT", "xml")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_kind_names() {
        for kind in [BackendKind::Memory, BackendKind::Sqlite, BackendKind::Postgres] {
            assert_eq!(BackendKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert_eq!(BackendKind::parse("PG").unwrap(), BackendKind::Postgres);
    }
}
