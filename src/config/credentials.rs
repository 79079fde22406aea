//! Server-configured default upstream credentials.
//!
//! An adapter falls back to these only when the incoming request carries no
//! provider-native auth header of its own.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl CredentialsConfig {
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("TOKENCAP_OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("TOKENCAP_ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let config = CredentialsConfig::default();
        assert!(config.openai_api_key.is_none());
        assert!(config.anthropic_api_key.is_none());
    }
}
