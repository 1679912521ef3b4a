//! strata configuration
//!
//! Configuration is resolved in three layers (highest priority first):
//! 1. Environment variables (`STRATA_WAIT_TIMEOUT_SECS`, `STRATA_LOG_FORMAT`)
//! 2. A YAML config file passed with `--config`
//! 3. Built-in defaults

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable overriding [`WaitConfig::timeout`], in seconds
pub const WAIT_TIMEOUT_ENV: &str = "STRATA_WAIT_TIMEOUT_SECS";

/// Environment variable overriding [`LoggingConfig::format`]
pub const LOG_FORMAT_ENV: &str = "STRATA_LOG_FORMAT";

/// Default time to wait for a remote operation to reach a terminal state (25 minutes)
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(25 * 60);

/// Default delay before the second status poll
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default cap on the delay between status polls
pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Poll and timeout settings for blocking on remote operations.
///
/// The delay between polls starts at `initial_delay` and grows by
/// `backoff_multiplier` up to `max_delay`. With `jitter` enabled each sleep
/// is scaled by a random factor in `0.5..1.5`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Maximum time to wait for a terminal state
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Delay before the second poll
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Maximum delay between polls
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Randomize each delay to avoid polling in lockstep
    pub jitter: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            initial_delay: DEFAULT_POLL_INTERVAL,
            max_delay: DEFAULT_MAX_POLL_INTERVAL,
            backoff_multiplier: 1.5,
            jitter: true,
        }
    }
}

impl WaitConfig {
    /// Create a config with the given timeout and default polling
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Fixed-interval polling without jitter
    pub fn fixed(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay that follows `delay` under this config's backoff
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }

    fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::config("wait.timeout must be greater than zero"));
        }
        if self.initial_delay.is_zero() {
            return Err(Error::config("wait.initial_delay must be greater than zero"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                "wait.max_delay must not be smaller than wait.initial_delay",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(Error::config("wait.backoff_multiplier must be at least 1.0"));
        }
        Ok(())
    }
}

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Text,
    /// JSON structured output
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!(
                "unknown log format {other:?} (expected text or json)"
            ))),
        }
    }
}

/// Logging settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Settings for blocking on remote operations
    pub wait: WaitConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl StrataConfig {
    /// Load config from an optional YAML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.wait.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&data)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(secs) = lookup(WAIT_TIMEOUT_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::config(format!("{WAIT_TIMEOUT_ENV} must be a number of seconds"))
            })?;
            self.wait.timeout = Duration::from_secs(secs);
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number of seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = StrataConfig::default();
        assert!(config.wait.validate().is_ok());
        assert_eq!(config.wait.timeout, DEFAULT_WAIT_TIMEOUT);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = WaitConfig {
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            ..Default::default()
        };
        assert_eq!(config.next_delay(Duration::from_secs(4)), Duration::from_secs(8));
        assert_eq!(config.next_delay(Duration::from_secs(8)), Duration::from_secs(10));

        let fixed = WaitConfig::fixed(Duration::from_secs(60), Duration::from_secs(3));
        assert_eq!(fixed.next_delay(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wait:\n  timeout: 120\nlogging:\n  format: json").unwrap();

        let config = StrataConfig::from_file(file.path()).unwrap();
        assert_eq!(config.wait.timeout, Duration::from_secs(120));
        assert_eq!(config.wait.initial_delay, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn env_overrides_win_over_file() {
        let env: HashMap<&str, &str> =
            HashMap::from([(WAIT_TIMEOUT_ENV, "90"), (LOG_FORMAT_ENV, "JSON")]);
        let mut config = StrataConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.wait.timeout, Duration::from_secs(90));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = StrataConfig::default();
        let err = config
            .apply_overrides(|k| (k == WAIT_TIMEOUT_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(WAIT_TIMEOUT_ENV));

        let zero = WaitConfig::with_timeout(Duration::ZERO);
        assert!(zero.validate().is_err());

        assert!("xml".parse::<LogFormat>().is_err());
    }
}
