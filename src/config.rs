//! Query engine configuration.

use serde::{Deserialize, Serialize};

/// Defaults applied while compiling parameters into a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Limit used when `_limit` is absent (default: 1). The relational
    /// backend never falls back to it for collection queries.
    #[serde(default = "default_limit")]
    pub default_limit: i64,

    /// Fail with `BadRequest` on unknown `_` directives instead of
    /// dropping them (default: false)
    #[serde(default)]
    pub reject_unknown_directives: bool,
}

const fn default_limit() -> i64 {
    1
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            reject_unknown_directives: false,
        }
    }
}

impl QueryConfig {
    /// Create a config with the given fallback limit
    #[must_use]
    pub fn with_default_limit(default_limit: i64) -> Self {
        Self {
            default_limit,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.default_limit, 1);
        assert!(!config.reject_unknown_directives);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: QueryConfig = serde_json::from_str(r#"{"default_limit": 25}"#).unwrap();
        assert_eq!(config.default_limit, 25);
        assert!(!config.reject_unknown_directives);
    }
}
