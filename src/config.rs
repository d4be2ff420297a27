//! Controller configuration loaded from environment variables.
//!
//! Every value has a default in [`crate::consts`]; a variable that is set but
//! cannot be parsed is an error rather than a silent fallback.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_NODE_CAPACITY, DRAW_BORDER_OFFSET};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to a value of the wrong type.
    #[error("config parse failed: {key}={value:?}: {reason}")]
    Parse { key: String, value: String, reason: String },

    /// A variable parsed but is out of range.
    #[error("invalid {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// How hit-testing picks among several threads under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Uniformly random candidate.
    #[default]
    Random,
    /// The most recently created candidate.
    MostRecent,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "recent" | "most_recent" => Ok(Self::MostRecent),
            other => Err(format!("unknown tie-break policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Stroke padding and hit-test half-width.
    pub border_offset: f64,
    pub tie_break: TieBreak,
    /// Seed for the random tie-break. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
    /// R-tree node capacity.
    pub node_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            border_offset: DRAW_BORDER_OFFSET,
            tie_break: TieBreak::default(),
            rng_seed: None,
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Load from `DRAW_BORDER_OFFSET`, `DRAW_TIE_BREAK`, `DRAW_RNG_SEED` and
    /// `DRAW_INDEX_NODE_CAPACITY`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an unparseable or
    /// out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            border_offset: env_parse("DRAW_BORDER_OFFSET", defaults.border_offset)?,
            tie_break: env_parse("DRAW_TIE_BREAK", defaults.tie_break)?,
            rng_seed: env_parse_opt("DRAW_RNG_SEED")?,
            node_capacity: env_parse("DRAW_INDEX_NODE_CAPACITY", defaults.node_capacity)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a negative or non-finite border
    /// offset or a zero node capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.border_offset.is_finite() || self.border_offset < 0.0 {
            return Err(ConfigError::Invalid {
                key: "DRAW_BORDER_OFFSET".into(),
                reason: format!("must be a finite, non-negative number, got {}", self.border_offset),
            });
        }
        if self.node_capacity == 0 {
            return Err(ConfigError::Invalid { key: "DRAW_INDEX_NODE_CAPACITY".into(), reason: "must be positive".into() });
        }
        Ok(())
    }
}

/// Parse `key` from the environment, or return `default` when it is unset.
pub(crate) fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(env_parse_opt(key)?.unwrap_or(default))
}

pub(crate) fn env_parse_opt<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(raw) = std::env::var(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Parse {
        key: key.to_owned(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}
