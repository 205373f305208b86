//! Configuration module for lcsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::environment::Environment;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for lcsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub workspace: WorkspaceConfig,
    pub watch: WatchConfig,
    pub deletion: DeletionConfig,
    pub logging: LoggingConfig,
}

/// Remote platform settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the platform API. Also selects the environment.
    pub base_url: String,
    /// Hits requested per search page.
    pub page_size: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Local workspace settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding one sub-directory per environment.
    pub root: PathBuf,
}

/// File watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet window (ms) a path must stay untouched before it is synced.
    pub debounce_ms: u64,
    /// Interval (ms) between the two size samples of the stability check.
    pub stability_check_ms: u64,
    /// Wait (ms) before a removed folder is treated as deleted, so a
    /// recursive removal of its owner can catch up.
    pub removal_settle_ms: u64,
}

/// Folder deletion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionConfig {
    /// Ask before propagating a deletion. `false` confirms automatically.
    pub confirm: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Missing or unreadable files yield the defaults
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// `<config dir>/lcsync/config.yaml`, e.g. under `$XDG_CONFIG_HOME`
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("~/.config"));
        base.join("lcsync").join("config.yaml")
    }

    /// Parsed remote base URL.
    pub fn base_url(&self) -> anyhow::Result<Url> {
        Url::parse(&self.remote.base_url)
            .map_err(|e| anyhow::anyhow!("invalid remote.base_url '{}': {e}", self.remote.base_url))
    }

    /// Environment selected by the remote base URL.
    pub fn environment(&self) -> anyhow::Result<Environment> {
        Ok(Environment::from_base_url(&self.base_url()?))
    }

    /// Local root directory of the configured environment.
    pub fn environment_root(&self) -> anyhow::Result<PathBuf> {
        Ok(self.environment()?.root(&self.workspace.root))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            page_size: 100,
            timeout_secs: 30,
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("lcsync"),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            stability_check_ms: 100,
            removal_settle_ms: 200,
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self { confirm: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"watch.debounce_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- remote ---
        if self.remote.base_url.is_empty() {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: "must be set".into(),
            });
        } else if let Err(e) = Url::parse(&self.remote.base_url) {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("invalid URL: {e}"),
            });
        }
        if self.remote.page_size == 0 {
            errors.push(ValidationError {
                field: "remote.page_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.remote.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- workspace ---
        if self.workspace.root.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "workspace.root".into(),
                message: "must be set".into(),
            });
        }

        // --- watch ---
        if self.watch.debounce_ms == 0 {
            errors.push(ValidationError {
                field: "watch.debounce_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.watch.stability_check_ms > self.watch.debounce_ms {
            errors.push(ValidationError {
                field: "watch.stability_check_ms".into(),
                message: format!(
                    "stability_check_ms ({}) must not exceed debounce_ms ({})",
                    self.watch.stability_check_ms, self.watch.debounce_ms
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent overrides on top of [`Config::default`], mostly for tests and
/// embedding.
///
/// # Example
///
/// ```rust,no_run
/// use lcsync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .remote_base_url("https://dev.platform.example/api")
///     .workspace_root(PathBuf::from("/home/user/lcsync"))
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_page_size(mut self, n: u32) -> Self {
        self.config.remote.page_size = n;
        self
    }

    pub fn remote_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.timeout_secs = seconds;
        self
    }

    // --- workspace ---

    pub fn workspace_root(mut self, root: PathBuf) -> Self {
        self.config.workspace.root = root;
        self
    }

    // --- watch ---

    pub fn watch_debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    pub fn watch_stability_check_ms(mut self, ms: u64) -> Self {
        self.config.watch.stability_check_ms = ms;
        self
    }

    pub fn watch_removal_settle_ms(mut self, ms: u64) -> Self {
        self.config.watch.removal_settle_ms = ms;
        self
    }

    // --- deletion ---

    pub fn deletion_confirm(mut self, confirm: bool) -> Self {
        self.config.deletion.confirm = confirm;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    pub fn build(self) -> Config {
        self.config
    }

    /// Like [`build`](Self::build), but rejects a config with problems
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let problems = self.config.validate();
        if problems.is_empty() {
            Ok(self.config)
        } else {
            Err(problems)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
