//! Startup configuration.
//!
//! # Responsibility
//! - Parse the TOML configuration consumed at process start.
//! - Provide defaults for every omitted section.
//!
//! # Invariants
//! - Configuration is resolved once; components copy what they need at
//!   construction and never observe later changes.
//! - Timeouts are strictly positive.
//!
//! Example:
//!
//! ```toml
//! [store]
//! path = "/var/lib/modelstore/elements.sqlite3"
//! busy_timeout_ms = 5000
//!
//! [repository]
//! delete_policy = "reparent"
//!
//! [health]
//! timeout_ms = 2000
//!
//! [logging]
//! level = "info"
//! dir = "/var/log/modelstore"
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2_000;

/// Errors from loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Read { path: PathBuf, message: String },
    /// Config text is not valid TOML for this schema.
    Parse(String),
    /// Config parsed but a value is out of range.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "failed to read config `{}`: {message}", path.display())
            }
            Self::Parse(message) => write!(f, "failed to parse config: {message}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Policy for deleting an element that still has children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse with a conflict.
    #[default]
    Reject,
    /// Remove the element together with its whole subtree.
    Cascade,
    /// Move the children to the deleted element's parent (or to root).
    #[serde(alias = "reparent_to_grandparent", alias = "reparent-to-grandparent")]
    Reparent,
}

impl DeletePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Cascade => "cascade",
            Self::Reparent => "reparent",
        }
    }
}

/// Store connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` opens a private in-memory store.
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Repository behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub delete_policy: DeletePolicy,
}

/// Health probe settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// File logging settings. Logging stays off when `dir` is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
}

/// Complete startup configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStoreConfig {
    pub store: StoreConfig,
    pub repository: RepositoryConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
}

impl ModelStoreConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    /// - `Parse` for malformed TOML or unknown enum values.
    /// - `Invalid` for zero timeouts.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "store.busy_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.health.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "health.timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DeletePolicy, ModelStoreConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ModelStoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, ModelStoreConfig::default());
        assert_eq!(config.repository.delete_policy, DeletePolicy::Reject);
        assert!(config.store.path.is_none());
        assert_eq!(config.health.timeout(), Duration::from_secs(2));
    }

    #[test]
    fn full_config_parses() {
        let config = ModelStoreConfig::from_toml_str(
            r#"
            [store]
            path = "/tmp/elements.sqlite3"
            busy_timeout_ms = 250

            [repository]
            delete_policy = "cascade"

            [health]
            timeout_ms = 50

            [logging]
            level = "debug"
            dir = "/tmp/logs"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.store.path,
            Some(PathBuf::from("/tmp/elements.sqlite3"))
        );
        assert_eq!(config.store.busy_timeout(), Duration::from_millis(250));
        assert_eq!(config.repository.delete_policy, DeletePolicy::Cascade);
        assert_eq!(config.health.timeout_ms, 50);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn reparent_policy_accepts_long_alias() {
        let config = ModelStoreConfig::from_toml_str(
            "[repository]\ndelete_policy = \"reparent-to-grandparent\"\n",
        )
        .unwrap();
        assert_eq!(config.repository.delete_policy, DeletePolicy::Reparent);
    }

    #[test]
    fn unknown_delete_policy_is_a_parse_error() {
        let err =
            ModelStoreConfig::from_toml_str("[repository]\ndelete_policy = \"orphan\"\n")
                .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_health_timeout_is_rejected() {
        let err = ModelStoreConfig::from_toml_str("[health]\ntimeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("health")));
    }
}
