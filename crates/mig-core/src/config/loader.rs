//! Configuration loading and persistence.

use super::{Config, TCP_SOCKET_GATEWAY, WEB_SERVICE_GATEWAY, WEB_SOCKET_GATEWAY};
use crate::error::ConfigError;
use crate::paths;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

const KNOWN_GATEWAYS: &[&str] = &[WEB_SERVICE_GATEWAY, WEB_SOCKET_GATEWAY, TCP_SOCKET_GATEWAY];

const AUTHENTICATION_MODES: &[&str] = &["none", "basic", "digest"];

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    pub fn load_or_default() -> Self {
        match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Gateways: known names, no duplicates, numeric ports
        let mut seen = HashSet::new();
        for gateway in &self.gateways {
            if !KNOWN_GATEWAYS.contains(&gateway.name.as_str()) {
                errors.push(format!("Unknown gateway '{}'", gateway.name));
            }
            if !seen.insert(gateway.name.as_str()) {
                errors.push(format!("Gateway '{}' is defined more than once", gateway.name));
            }
            let options = gateway.option_set();
            if let Some(port) = options.get("Port") {
                if port.value.parse::<u16>().is_err() {
                    errors.push(format!(
                        "Gateway '{}': invalid Port '{}'",
                        gateway.name, port.value
                    ));
                }
            }
            if let Some(auth) = options.get("Authentication") {
                if !AUTHENTICATION_MODES.contains(&auth.value.to_ascii_lowercase().as_str()) {
                    errors.push(format!(
                        "Gateway '{}': invalid Authentication '{}', expected None, Basic or Digest",
                        gateway.name, auth.value
                    ));
                }
            }
        }

        // 2. Interfaces: non-empty, unique domains and a factory type
        let mut domains = HashSet::new();
        for (i, interface) in self.interfaces.iter().enumerate() {
            if interface.domain.trim().is_empty() {
                errors.push(format!("Interface [{}]: domain must not be empty", i));
            } else if !domains.insert(interface.domain.as_str()) {
                errors.push(format!(
                    "Interface '{}' is defined more than once",
                    interface.domain
                ));
            }
            if interface.interface_type.trim().is_empty() {
                errors.push(format!("Interface [{}]: type must not be empty", i));
            }
        }

        // 3. Users: names unique, passwords present
        let mut users = HashSet::new();
        for user in &self.users {
            if !users.insert(user.name.as_str()) {
                errors.push(format!("User '{}' is defined more than once", user.name));
            }
            if user.password.is_empty() {
                errors.push(format!("User '{}' has an empty password", user.name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Look up a gateway section by name.
    pub fn gateway(&self, name: &str) -> Option<&super::GatewayConfig> {
        self.gateways.iter().find(|g| g.name == name)
    }

    /// Look up a stored user password digest.
    pub fn user_password(&self, name: &str) -> Option<&str> {
        self.users
            .iter()
            .find(|u| u.name == name)
            .map(|u| u.password.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{GatewayConfig, InterfaceConfig, UserConfig};
    use super::*;
    use crate::option::MigOption;

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_json5_with_comments() {
        let config = Config::parse(
            r#"{
                // transports
                gateways: [
                    { name: "WebServiceGateway", options: [ { name: "Port", value: "8888" } ] },
                ],
                interfaces: [
                    { domain: "HomeAutomation.X10", type: "x10", enabled: true },
                ],
                users: [ { name: "admin", password: "abc" } ],
                logging: { level: "debug", json: true },
            }"#,
        )
        .unwrap();

        assert_eq!(config.gateways.len(), 1);
        assert!(config.gateways[0].enabled);
        assert_eq!(config.gateways[0].option_set().value("Port"), "8888");
        assert_eq!(config.interfaces[0].interface_type, "x10");
        assert!(config.interfaces[0].enabled);
        assert_eq!(config.user_password("admin"), Some("abc"));
        assert!(config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_json5() {
        let result = Config::parse("{ gateways: [ ");
        assert!(matches!(result, Err(ConfigError::Json5(_))));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.gateways.push(GatewayConfig::new("CarrierPigeonGateway"));
        config.gateways.push(GatewayConfig::new("TcpSocketGateway").with_option("Port", "x"));
        config.interfaces.push(InterfaceConfig {
            domain: String::new(),
            interface_type: String::new(),
            enabled: false,
            options: vec![MigOption::new("Port", "COM1")],
        });
        config.users.push(UserConfig {
            name: "admin".to_string(),
            password: String::new(),
        });

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("CarrierPigeonGateway"), "{}", err);
        assert!(err.contains("more than once"), "{}", err);
        assert!(err.contains("invalid Port"), "{}", err);
        assert!(err.contains("domain must not be empty"), "{}", err);
        assert!(err.contains("type must not be empty"), "{}", err);
        assert!(err.contains("empty password"), "{}", err);
    }

    #[test]
    fn test_validate_authentication_mode() {
        let mut config = Config::default();
        config.gateways[0]
            .options
            .push(MigOption::new("Authentication", "Kerberos"));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Kerberos"), "{}", err);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mig.json5");

        let mut config = Config::default();
        config.users.push(UserConfig {
            name: "admin".to_string(),
            password: "digest".to_string(),
        });
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gateways.len(), 3);
        assert_eq!(loaded.user_password("admin"), Some("digest"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(&dir.path().join("absent.json5"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
