//! Configuration module for tokencap
//!
//! Layered precedence: TOML file → `TOKENCAP_*` environment variables →
//! built-in defaults. `GatewayConfig::load` reads the file (if given and
//! present), `with_env_overrides` layers environment variables on top, and
//! `validate` runs last, once CLI overrides (if any) have also been applied.

pub mod credentials;
pub mod error;
pub mod logging;
pub mod server;

pub use credentials::CredentialsConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub credentials: CredentialsConfig,
    /// `./tokencap.db` unless overridden.
    pub database_path: String,
    /// Used when no `X-Tokencap-Project-Id` header or `project_id` query
    /// parameter is present.
    pub default_project_id: String,
    /// Fallback output-token estimate when a model has no documented
    /// default maximum output (§4.2, low-confidence path).
    pub default_max_output_tokens: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            credentials: CredentialsConfig::default(),
            database_path: "./tokencap.db".to_string(),
            default_project_id: "default".to_string(),
            default_max_output_tokens: 4096,
        }
    }
}

impl GatewayConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            Some(path) => Err(ConfigError::NotFound(path.to_path_buf())),
            None => Ok(Self::default()),
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("TOKENCAP_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(host) = std::env::var("TOKENCAP_HOST") {
            self.server.host = host;
        }
        if let Ok(level) = std::env::var("TOKENCAP_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TOKENCAP_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.logging.format = format;
            }
        }
        if let Ok(path) = std::env::var("TOKENCAP_DB_PATH") {
            self.database_path = path;
        }
        if let Ok(project_id) = std::env::var("TOKENCAP_DEFAULT_PROJECT_ID") {
            self.default_project_id = project_id;
        }
        self.credentials = self.credentials.with_env_overrides();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be nonzero".to_string(),
            });
        }
        if self.default_project_id.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "default_project_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "database_path".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database_path, "./tokencap.db");
    }

    #[test]
    fn missing_file_when_path_given_is_error() {
        let err = GatewayConfig::load(Some(Path::new("/nonexistent/tokencap.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn no_path_uses_defaults() {
        let config = GatewayConfig::load(None).unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9090\nhost = \"127.0.0.1\"").unwrap();
        let config = GatewayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        std::env::set_var("TOKENCAP_PORT", "7777");
        let config = GatewayConfig::default().with_env_overrides();
        assert_eq!(config.server.port, 7777);
        std::env::remove_var("TOKENCAP_PORT");
    }

    #[test]
    fn zero_port_fails_validation() {
        let mut config = GatewayConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
