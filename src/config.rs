//! Configuration module for sockmux
//!
//! JSON-backed configuration; every field has a default so an empty
//! object is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::TrustPolicy;

/// Read buffer size per connection (32KB)
const DEFAULT_READ_BUFFER_SIZE: usize = 32 * 1024;

/// Manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Certificate-trust policy for client handshakes
    #[serde(default)]
    pub trust_policy: TrustPolicy,

    /// ALPN protocols offered during TLS handshakes
    #[serde(default)]
    pub alpn: Vec<String>,

    /// Read buffer size per connection
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            trust_policy: TrustPolicy::default(),
            alpn: vec![],
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ManagerConfig {
    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_valid() {
        let config = ManagerConfig::from_json("{}").unwrap();
        assert_eq!(config.trust_policy, TrustPolicy::Strict);
        assert!(config.alpn.is_empty());
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_trust_policy_from_json() {
        let config = ManagerConfig::from_json(r#"{"trust_policy": "trust_all"}"#).unwrap();
        assert_eq!(config.trust_policy, TrustPolicy::TrustAll);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = ManagerConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
