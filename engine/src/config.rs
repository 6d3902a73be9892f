//! Engine configuration.

use crate::value::DATETIME_FORMAT;
use std::env;

/// Options shared by every entity of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Reject commits that leave a required field unset
    pub enforce_required: bool,
    /// `strftime` format used to write date-time and timestamp fields
    pub datetime_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enforce_required: false,
            datetime_format: DATETIME_FORMAT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `ROWMAP_ENFORCE_REQUIRED`: `true`/`false` (also `1`/`0`, `yes`/`no`)
    /// - `ROWMAP_DATETIME_FORMAT`: `strftime` pattern
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("ROWMAP_ENFORCE_REQUIRED") {
            config.enforce_required = parse_flag(&raw)
                .ok_or_else(|| ConfigError::InvalidFlag("ROWMAP_ENFORCE_REQUIRED", raw))?;
        }

        if let Some(format) = lookup("ROWMAP_DATETIME_FORMAT") {
            if format.trim().is_empty() {
                return Err(ConfigError::EmptyDatetimeFormat);
            }
            config.datetime_format = format;
        }

        Ok(config)
    }

    pub fn with_enforce_required(mut self, enforce: bool) -> Self {
        self.enforce_required = enforce;
        self
    }

    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be a boolean, got '{1}'")]
    InvalidFlag(&'static str, String),

    #[error("ROWMAP_DATETIME_FORMAT must not be empty")]
    EmptyDatetimeFormat,
}
