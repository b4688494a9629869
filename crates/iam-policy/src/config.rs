//! SDK configuration.

use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};

/// Settings for the [`Iam`](crate::iam::Iam) facade and its evaluator.
///
/// ```yaml
/// cache_ttl_secs: 10
/// strict_operators: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IamConfig {
    /// How long a cached `is_allowed_with_cache` result stays valid. `0` disables caching.
    pub cache_ttl_secs: u64,

    /// Reject unknown operators at parse time instead of evaluating them as false.
    pub strict_operators: bool,
}

impl Default for IamConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 10,
            strict_operators: false,
        }
    }
}

impl IamConfig {
    /// Sets the cache TTL.
    pub fn with_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    /// Sets strict operator parsing.
    pub fn with_strict_operators(mut self, strict: bool) -> Self {
        self.strict_operators = strict;
        self
    }

    /// Parses a config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: IamConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: IamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the config.
    pub fn validate(&self) -> Result<()> {
        // chrono durations are bounded by i64 milliseconds
        if self.cache_ttl_secs > i64::MAX as u64 / 1000 {
            return Err(PolicyError::invalid_field(
                "cache_ttl_secs",
                format!("{} is out of range", self.cache_ttl_secs),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IamConfig::from_yaml("{}").unwrap();
        assert_eq!(config, IamConfig::default());
        assert_eq!(config.cache_ttl_secs, 10);
        assert!(!config.strict_operators);
    }

    #[test]
    fn test_from_yaml() {
        let config = IamConfig::from_yaml("cache_ttl_secs: 60\nstrict_operators: true\n").unwrap();
        assert_eq!(config.cache_ttl_secs, 60);
        assert!(config.strict_operators);
    }

    #[test]
    fn test_from_json_rejects_out_of_range_ttl() {
        let json = format!(r#"{{"cache_ttl_secs": {}}}"#, u64::MAX);
        assert!(IamConfig::from_json(&json).is_err());
    }
}
