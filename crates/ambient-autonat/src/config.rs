//! AutoNAT configuration
//!
//! All tunables are durations. In TOML they are written in whole seconds:
//!
//! ```toml
//! boot_delay_secs = 15
//! retry_interval_secs = 60
//! refresh_interval_secs = 900
//! request_timeout_secs = 60
//! ```
//!
//! Every key is optional and falls back to its default.

use crate::error::{AutoNatError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default delay before the first detection cycle
pub const DEFAULT_BOOT_DELAY: Duration = Duration::from_secs(15);

/// Default sleep between cycles while the status is unknown
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Default sleep between cycles once the status is public or private
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default timeout for a single dial-back probe
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// AutoNAT configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoNatConfig {
    /// Warm-up delay before the first cycle, letting the host gather peers
    #[serde(
        rename = "boot_delay_secs",
        with = "duration_secs",
        default = "default_boot_delay"
    )]
    pub boot_delay: Duration,

    /// Sleep after a cycle that left the status unknown
    #[serde(
        rename = "retry_interval_secs",
        with = "duration_secs",
        default = "default_retry_interval"
    )]
    pub retry_interval: Duration,

    /// Sleep after a cycle that left the status public or private
    #[serde(
        rename = "refresh_interval_secs",
        with = "duration_secs",
        default = "default_refresh_interval"
    )]
    pub refresh_interval: Duration,

    /// Upper bound on a single dial-back probe
    #[serde(
        rename = "request_timeout_secs",
        with = "duration_secs",
        default = "default_request_timeout"
    )]
    pub request_timeout: Duration,
}

// Default values

fn default_boot_delay() -> Duration {
    DEFAULT_BOOT_DELAY
}

fn default_retry_interval() -> Duration {
    DEFAULT_RETRY_INTERVAL
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl Default for AutoNatConfig {
    fn default() -> Self {
        Self {
            boot_delay: DEFAULT_BOOT_DELAY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl AutoNatConfig {
    /// Set the boot delay
    #[must_use]
    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Set the retry interval
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the refresh interval
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the per-probe request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Render configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AutoNatError::ConfigParse(e.to_string()))
    }

    /// Validate configuration
    ///
    /// Every field must be a whole number of seconds, matching what the TOML
    /// form can hold. The boot delay may be zero. The loop intervals and the
    /// request timeout may not: a zero interval would spin and a zero timeout
    /// would fail every probe.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("boot_delay", self.boot_delay),
            ("retry_interval", self.retry_interval),
            ("refresh_interval", self.refresh_interval),
            ("request_timeout", self.request_timeout),
        ];
        for (name, value) in fields {
            if value.subsec_nanos() != 0 {
                return Err(AutoNatError::InvalidConfig(
                    format!("{name} must be a whole number of seconds, got {value:?}").into(),
                ));
            }
        }

        if self.retry_interval.is_zero() {
            return Err(AutoNatError::invalid_config("retry_interval must be non-zero"));
        }
        if self.refresh_interval.is_zero() {
            return Err(AutoNatError::invalid_config(
                "refresh_interval must be non-zero",
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(AutoNatError::invalid_config(
                "request_timeout must be non-zero",
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if duration.subsec_nanos() != 0 {
            return Err(S::Error::custom(format!(
                "{duration:?} is not a whole number of seconds"
            )));
        }
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
