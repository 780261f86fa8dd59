//! Session configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};

/// Behavior switches shared by every document of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity lookups that find nothing fail with `Error::NotFound`
    pub raise_not_found_error: bool,
    /// Allow setting attributes the class did not declare
    pub allow_dynamic_fields: bool,
    /// Create indexes for relations declared with `index: true` when the
    /// session opens
    pub autocreate_indexes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raise_not_found_error: true,
            allow_dynamic_fields: true,
            autocreate_indexes: false,
        }
    }
}

impl Config {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid configuration: {e}"),
                source: Some(Box::new(e)),
            })
        })
    }

    /// Set whether identity lookups raise on a miss.
    #[must_use]
    pub fn raise_not_found_error(mut self, raise: bool) -> Self {
        self.raise_not_found_error = raise;
        self
    }

    /// Set whether undeclared attributes may be written.
    #[must_use]
    pub fn allow_dynamic_fields(mut self, allow: bool) -> Self {
        self.allow_dynamic_fields = allow;
        self
    }

    /// Set whether declared relation indexes are created on session start.
    #[must_use]
    pub fn autocreate_indexes(mut self, create: bool) -> Self {
        self.autocreate_indexes = create;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.raise_not_found_error);
        assert!(config.allow_dynamic_fields);
        assert!(!config.autocreate_indexes);
    }

    #[test]
    fn test_builder() {
        let config = Config::new()
            .raise_not_found_error(false)
            .allow_dynamic_fields(false)
            .autocreate_indexes(true);
        assert!(!config.raise_not_found_error);
        assert!(!config.allow_dynamic_fields);
        assert!(config.autocreate_indexes);
    }

    #[test]
    fn test_from_json_partial() {
        let config = Config::from_json(r#"{"autocreate_indexes": true}"#).unwrap();
        assert!(config.autocreate_indexes);
        assert!(config.raise_not_found_error);
    }

    #[test]
    fn test_from_json_invalid() {
        let err = Config::from_json("{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
