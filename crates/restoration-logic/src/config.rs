//! Engine configuration — countdown target and save retry budget.
//!
//! Defaults are compiled in; a JSON document or environment variables may
//! override them. Invalid environment values are logged and ignored.

use std::env;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const TARGET_DATE_ENV: &str = "RESTORATION_TARGET_DATE";
pub const MAX_SAVE_ATTEMPTS_ENV: &str = "RESTORATION_MAX_SAVE_ATTEMPTS";

/// 2030-01-01T00:00:00Z
const DEFAULT_TARGET_TIMESTAMP: i64 = 1_893_456_000;
const DEFAULT_MAX_SAVE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// The date the decay countdown runs toward.
    #[serde(default = "default_target_date")]
    pub target_date: DateTime<Utc>,
    /// Read-modify-write attempts before a version conflict is surfaced.
    #[serde(default = "default_max_save_attempts")]
    pub max_save_attempts: u32,
}

fn default_target_date() -> DateTime<Utc> {
    DateTime::from_timestamp(DEFAULT_TARGET_TIMESTAMP, 0).unwrap_or_default()
}

fn default_max_save_attempts() -> u32 {
    DEFAULT_MAX_SAVE_ATTEMPTS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_date: default_target_date(),
            max_save_attempts: default_max_save_attempts(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from defaults plus whatever `lookup` returns for the known keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(TARGET_DATE_ENV) {
            match parse_target_date(&raw) {
                Ok(date) => config.target_date = date,
                Err(err) => log::warn!("{}; keeping {}", err, config.target_date),
            }
        }

        if let Some(raw) = lookup(MAX_SAVE_ATTEMPTS_ENV) {
            let parsed = raw.trim().parse::<u32>();
            match parsed {
                Ok(n) if n > 0 => config.max_save_attempts = n,
                _ => log::warn!(
                    "{}; keeping {}",
                    ConfigError::InvalidValue {
                        key: MAX_SAVE_ATTEMPTS_ENV,
                        value: raw,
                    },
                    config.max_save_attempts
                ),
            }
        }

        config
    }
}

fn parse_target_date(raw: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ConfigError::InvalidValue {
            key: TARGET_DATE_ENV,
            value: raw.to_string(),
        })
}
