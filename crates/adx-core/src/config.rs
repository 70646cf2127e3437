use serde::{Deserialize, Serialize};

use crate::types::MAX_PATTERN_LEN;

/// How rule identifiers are assigned to blocked patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Assigned once from a persisted counter and kept for the pattern's
    /// lifetime.
    #[default]
    Stable,
    /// `1000 + index`, recomputed after every mutation. Removing an entry
    /// shifts the identifiers of everything after it.
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockerConfig {
    #[serde(default)]
    pub id_scheme: IdScheme,

    /// Gate `add` behind the premium entitlement.
    #[serde(default)]
    pub require_premium: bool,

    #[serde(default = "default_max_pattern_len")]
    pub max_pattern_len: usize,

    /// Dynamic rule quota enforced by file-backed engines.
    #[serde(default = "default_rule_quota")]
    pub rule_quota: usize,
}

fn default_max_pattern_len() -> usize {
    MAX_PATTERN_LEN
}

fn default_rule_quota() -> usize {
    5000
}

impl Default for BlockerConfig {
    fn default() -> Self {
        Self {
            id_scheme: IdScheme::default(),
            require_premium: false,
            max_pattern_len: default_max_pattern_len(),
            rule_quota: default_rule_quota(),
        }
    }
}

impl BlockerConfig {
    /// Parse from JSON, filling every missing field with its default.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_id_scheme(mut self, id_scheme: IdScheme) -> Self {
        self.id_scheme = id_scheme;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        assert_eq!(BlockerConfig::from_json("{}").unwrap(), BlockerConfig::default());
    }

    #[test]
    fn parses_fields() {
        let config = BlockerConfig::from_json(
            r#"{"id_scheme":"positional","require_premium":true,"max_pattern_len":200}"#,
        )
        .unwrap();
        assert_eq!(config.id_scheme, IdScheme::Positional);
        assert!(config.require_premium);
        assert_eq!(config.max_pattern_len, 200);
        assert_eq!(config.rule_quota, 5000);
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(BlockerConfig::from_json(r#"{"id_scheme":"random"}"#).is_err());
    }
}
