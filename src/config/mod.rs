//! # Weave Configuration
//!
//! Layered configuration for the dispatcher lanes, the blocking-wait helper and
//! failure classification.
//!
//! ## Layers
//!
//! 1. Built-in defaults
//! 2. An optional TOML/YAML/JSON file (format picked from the extension)
//! 3. `WEAVE__`-prefixed environment variables, `__` between path segments
//!    (`WEAVE__BLOCKING__DEFAULT_TIMEOUT_MS=500`)
//!
//! The merged result is validated before it is returned.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use weave_core::config::WeaveConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), weave_core::WeaveError> {
//! let config = WeaveConfig::load(Some(Path::new("config/weave.toml")))?;
//! let timeout = config.blocking.timeout();
//! # let _ = timeout;
//! # Ok(())
//! # }
//! ```

use crate::error::{WeaveError, WeaveResult};
use crate::request::StatusClassifier;
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "WEAVE";
const ENV_SEPARATOR: &str = "__";

/// Root configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeaveConfig {
    pub dispatcher: DispatcherConfig,
    pub blocking: BlockingConfig,
    pub classification: ClassificationConfig,
}

/// Lane runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub foreground_thread_name: String,
    pub background_thread_name: String,
    /// Worker count for the background lane; `None` lets the runtime decide
    pub background_worker_threads: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            foreground_thread_name: "weave-foreground".to_string(),
            background_thread_name: "weave-background".to_string(),
            background_worker_threads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    pub default_timeout_ms: u64,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

impl BlockingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Status codes treated as authorization failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub authorization_statuses: Vec<u16>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            authorization_statuses: vec![crate::request::envelope::UNAUTHORIZED],
        }
    }
}

impl ClassificationConfig {
    pub fn classifier(&self) -> StatusClassifier {
        StatusClassifier::new(self.authorization_statuses.clone())
    }
}

impl WeaveConfig {
    /// Load defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> WeaveResult<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&WeaveConfig::default())?);
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading weave configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: WeaveConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(
            foreground = %config.dispatcher.foreground_thread_name,
            background = %config.dispatcher.background_thread_name,
            timeout_ms = config.blocking.default_timeout_ms,
            "Weave configuration loaded"
        );
        Ok(config)
    }

    /// Defaults plus environment overrides, no file
    pub fn from_env() -> WeaveResult<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> WeaveResult<()> {
        if self.dispatcher.foreground_thread_name.trim().is_empty() {
            return Err(WeaveError::Configuration(
                "dispatcher.foreground_thread_name must not be empty".to_string(),
            ));
        }
        if self.dispatcher.background_thread_name.trim().is_empty() {
            return Err(WeaveError::Configuration(
                "dispatcher.background_thread_name must not be empty".to_string(),
            ));
        }
        if self.dispatcher.background_worker_threads == Some(0) {
            return Err(WeaveError::Configuration(
                "dispatcher.background_worker_threads must be at least 1".to_string(),
            ));
        }
        if self.blocking.default_timeout_ms == 0 {
            return Err(WeaveError::Configuration(
                "blocking.default_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.classification.authorization_statuses.is_empty() {
            return Err(WeaveError::Configuration(
                "classification.authorization_statuses must list at least one status".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WeaveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blocking.timeout(), Duration::from_secs(30));
        assert_eq!(config.classification.authorization_statuses, vec![401]);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = WeaveConfig::default();
        config.blocking.default_timeout_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(WeaveError::Configuration(message)) if message.contains("default_timeout_ms")
        ));
    }

    #[test]
    fn test_validation_rejects_zero_workers_and_empty_statuses() {
        let mut config = WeaveConfig::default();
        config.dispatcher.background_worker_threads = Some(0);
        assert!(config.validate().is_err());

        let mut config = WeaveConfig::default();
        config.classification.authorization_statuses.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_from_config() {
        use crate::request::{FailureClassifier, FailureEnvelope, FailureKind, RawResponse};

        let config = ClassificationConfig {
            authorization_statuses: vec![401, 403],
        };
        let forbidden = FailureEnvelope::from_response(RawResponse::new(403));
        assert_eq!(
            config.classifier().classify(&forbidden),
            FailureKind::Authorization
        );
    }
}
