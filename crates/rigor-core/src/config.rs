//! Engine configuration.
//!
//! Defaults can be overridden from a YAML file and from `RIGOR_*`
//! environment variables. Environment values that do not parse are ignored.
//!
//! ```yaml
//! poll_interval_ms: 5
//! measure_iterations: 20
//! module_name: NetworkTests
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors from loading or validating a [`RigorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigorConfig {
    /// Upper bound on how long a waiter sleeps between checks.
    pub poll_interval_ms: u64,

    /// How often predicate expectations re-evaluate.
    pub predicate_interval_ms: u64,

    /// Iterations of a `measure` block.
    pub measure_iterations: usize,

    /// Percent.
    pub max_relative_std_dev: f64,

    /// Seconds.
    pub max_std_dev: f64,

    /// Initial continue-after-failure policy of every test case.
    pub continue_after_failure: bool,

    /// Module used for test classes registered without one.
    pub module_name: String,

    /// Name of the test bundle, without the `.xctest` suffix.
    pub bundle_name: String,
}

impl Default for RigorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            predicate_interval_ms: 10,
            measure_iterations: 10,
            max_relative_std_dev: 10.0,
            max_std_dev: 0.1,
            continue_after_failure: true,
            module_name: "Tests".to_string(),
            bundle_name: default_bundle_name(),
        }
    }
}

fn default_bundle_name() -> String {
    env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "rigor".to_string())
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl RigorConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overrides fields from `RIGOR_*` environment variables.
    pub fn apply_env(&mut self) {
        if let Some(value) = env_value("RIGOR_POLL_INTERVAL_MS") {
            self.poll_interval_ms = value;
        }
        if let Some(value) = env_value("RIGOR_PREDICATE_INTERVAL_MS") {
            self.predicate_interval_ms = value;
        }
        if let Some(value) = env_value("RIGOR_MEASURE_ITERATIONS") {
            self.measure_iterations = value;
        }
        if let Some(value) = env_value("RIGOR_MAX_RELATIVE_STD_DEV") {
            self.max_relative_std_dev = value;
        }
        if let Some(value) = env_value("RIGOR_MAX_STD_DEV") {
            self.max_std_dev = value;
        }
        if let Some(value) = env_value("RIGOR_CONTINUE_AFTER_FAILURE") {
            self.continue_after_failure = value;
        }
        if let Ok(value) = env::var("RIGOR_MODULE")
            && !value.is_empty()
        {
            self.module_name = value;
        }
        if let Ok(value) = env::var("RIGOR_BUNDLE")
            && !value.is_empty()
        {
            self.bundle_name = value;
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&yaml)?;
        config.apply_env();
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.predicate_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "predicate_interval_ms must be positive".into(),
            ));
        }
        if self.measure_iterations == 0 {
            return Err(ConfigError::Invalid("measure_iterations must be positive".into()));
        }
        if !(self.max_relative_std_dev >= 0.0 && self.max_std_dev >= 0.0) {
            return Err(ConfigError::Invalid(
                "standard deviation limits must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn predicate_interval(&self) -> Duration {
        Duration::from_millis(self.predicate_interval_ms)
    }

    /// `{bundle_name}.xctest`
    pub fn bundle_suite_name(&self) -> String {
        format!("{}.xctest", self.bundle_name)
    }
}
