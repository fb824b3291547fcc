//! Loader configuration.
//!
//! Settings can be built in code or read from the environment:
//!
//! - `SQLCONTAIN_BUFFER_WARN_ROWS`: warn when the key-collection pass buffers more rows
//! - `SQLCONTAIN_STRICT_KEYS`: `1`/`true`/`yes`/`on` fails on rows missing a key column
//! - `SQLCONTAIN_JOIN_TYPE`: `left` or `inner`, the join used for contained associations

use crate::join::JoinType;
use serde::{Deserialize, Serialize};
use sqlcontain_core::{Error, Result};
use std::env;

/// Configuration shared by every query a registry constructs.
///
/// Deserializes from a partial object; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Warn when the key-collection pass buffers more rows than this.
    pub buffer_warn_rows: usize,
    /// Fail instead of skipping rows that lack a deferred association's key column.
    pub strict_keys: bool,
    /// Join type for contained associations without `matching`.
    pub default_join_type: JoinType,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            buffer_warn_rows: 10_000,
            strict_keys: false,
            default_join_type: JoinType::Left,
        }
    }
}

impl LoaderConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffered-row warning threshold.
    pub fn buffer_warn_rows(mut self, rows: usize) -> Self {
        self.buffer_warn_rows = rows;
        self
    }

    /// Set strict key handling.
    pub fn strict_keys(mut self, strict: bool) -> Self {
        self.strict_keys = strict;
        self
    }

    /// Set the default join type.
    pub fn default_join_type(mut self, join_type: JoinType) -> Self {
        self.default_join_type = join_type;
        self
    }

    /// Read the configuration from `SQLCONTAIN_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable values are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("SQLCONTAIN_BUFFER_WARN_ROWS") {
            config.buffer_warn_rows = raw.trim().parse().map_err(|_| {
                Error::config(format!(
                    "SQLCONTAIN_BUFFER_WARN_ROWS must be a row count, got '{}'",
                    raw
                ))
            })?;
        }

        if let Some(raw) = lookup("SQLCONTAIN_STRICT_KEYS") {
            config.strict_keys = parse_flag(&raw).ok_or_else(|| {
                Error::config(format!(
                    "SQLCONTAIN_STRICT_KEYS must be a boolean, got '{}'",
                    raw
                ))
            })?;
        }

        if let Some(raw) = lookup("SQLCONTAIN_JOIN_TYPE") {
            config.default_join_type = raw.parse()?;
        }

        Ok(config)
    }

    /// Read the configuration from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LoaderConfig::default());
        assert_eq!(config.buffer_warn_rows, 10_000);
        assert!(!config.strict_keys);
        assert_eq!(config.default_join_type, JoinType::Left);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = LoaderConfig::from_lookup(lookup(&[
            ("SQLCONTAIN_BUFFER_WARN_ROWS", "250"),
            ("SQLCONTAIN_STRICT_KEYS", "yes"),
            ("SQLCONTAIN_JOIN_TYPE", "inner"),
        ]))
        .unwrap();
        assert_eq!(config.buffer_warn_rows, 250);
        assert!(config.strict_keys);
        assert_eq!(config.default_join_type, JoinType::Inner);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err =
            LoaderConfig::from_lookup(lookup(&[("SQLCONTAIN_BUFFER_WARN_ROWS", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = LoaderConfig::from_lookup(lookup(&[("SQLCONTAIN_STRICT_KEYS", "maybe")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = LoaderConfig::from_lookup(lookup(&[("SQLCONTAIN_JOIN_TYPE", "cross")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_json_partial() {
        let config = LoaderConfig::from_json(r#"{"strict_keys": true, "default_join_type": "inner"}"#)
            .unwrap();
        assert!(config.strict_keys);
        assert_eq!(config.default_join_type, JoinType::Inner);
        assert_eq!(config.buffer_warn_rows, 10_000);
        assert!(LoaderConfig::from_json("[]").is_err());
    }

    #[test]
    fn test_builder() {
        let config = LoaderConfig::new()
            .buffer_warn_rows(5)
            .strict_keys(true)
            .default_join_type(JoinType::Inner);
        assert_eq!(config.buffer_warn_rows, 5);
        assert!(config.strict_keys);
    }
}
