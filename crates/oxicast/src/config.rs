//! Runtime configuration.
//!
//! Two settings are read from the environment:
//!
//! - `OXICAST_LOG`: log level (`error`, `warn`, `info`, `debug`, `trace`)
//! - `OXICAST_FATAL`: what an unconditional cast failure does (`abort` or
//!   `panic`)
//!
//! # Example
//!
//! ```
//! use oxicast::{FatalMode, RuntimeConfig};
//! use oxicast_log::Level;
//!
//! let config = RuntimeConfig::from_lookup(|key| match key {
//!     "OXICAST_FATAL" => Some("panic".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(config.fatal_mode, FatalMode::Panic);
//! assert_eq!(config.log_level, Level::Warn);
//! ```

use crate::error::{Error, Result};
use oxicast_log::Level;
use std::fmt;
use std::str::FromStr;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "OXICAST_LOG";

/// Environment variable holding the fatal mode.
pub const FATAL_ENV: &str = "OXICAST_FATAL";

/// What an unconditional cast failure does after it is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FatalMode {
    /// Log the report and abort the process.
    #[default]
    Abort,
    /// Panic with the report. Unwinds only the calling thread.
    Panic,
}

impl FromStr for FatalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FatalMode::Abort),
            "panic" => Ok(FatalMode::Panic),
            _ => Err(Error::InvalidConfiguration {
                key: FATAL_ENV.to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for FatalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalMode::Abort => f.write_str("abort"),
            FatalMode::Panic => f.write_str("panic"),
        }
    }
}

/// Process-wide runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Level for the global logger.
    pub log_level: Level,
    /// Behavior of unconditional cast failures.
    pub fatal_mode: FatalMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            log_level: Level::Warn,
            fatal_mode: FatalMode::Abort,
        }
    }
}

impl RuntimeConfig {
    /// Reads the configuration from the process environment. Unset
    /// variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a value that cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a value that cannot be
    /// parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(raw) = lookup(LOG_ENV) {
            config.log_level = raw.parse().map_err(|_| Error::InvalidConfiguration {
                key: LOG_ENV.to_string(),
                value: raw.clone(),
            })?;
        }

        if let Some(raw) = lookup(FATAL_ENV) {
            config.fatal_mode = raw.parse()?;
        }

        Ok(config)
    }

    /// Applies the log level to the global logger.
    pub fn apply(&self) {
        oxicast_log::set_level(self.log_level);
    }
}
