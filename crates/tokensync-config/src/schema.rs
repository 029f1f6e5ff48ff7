//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokensync_runtime::RetryOptions;

use crate::loader::ConfigLoader;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registration: RegistrationSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub http: HttpSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Registration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationSection {
    /// Key of the persisted registration info.
    #[serde(default = "default_installation_id")]
    pub installation_id: String,

    /// Value of the `development` field sent with every registration.
    #[serde(default)]
    pub development: bool,
}

impl Default for RegistrationSection {
    fn default() -> Self {
        Self {
            installation_id: default_installation_id(),
            development: false,
        }
    }
}

fn default_installation_id() -> String {
    "default".to_string()
}

/// Retry backoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_exponential_factor")]
    pub exponential_factor: f64,

    /// Cap on a single backoff delay.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,

    /// Attempt ceiling. Retries forever when unset.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            exponential_factor: default_exponential_factor(),
            max_delay_ms: None,
            max_attempts: None,
            jitter: false,
        }
    }
}

impl RetrySection {
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            exponential_factor: self.exponential_factor,
            max_delay: self.max_delay_ms.map(Duration::from_millis),
            max_attempts: self.max_attempts,
            jitter: self.jitter,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_exponential_factor() -> f64 {
    2.0
}

/// Registration store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreSection {
    /// Store directory with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.path))
    }
}

fn default_store_path() -> String {
    "~/.tokensync/registrations".to_string()
}

/// HTTP transport settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSection {
    /// Per-request timeout. Requests only end by response or interrupt when unset.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl HttpSection {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl LoggingSection {
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .as_deref()
            .map(|dir| PathBuf::from(ConfigLoader::expand_path(dir)))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
