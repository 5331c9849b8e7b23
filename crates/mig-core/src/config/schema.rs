//! Configuration schema definitions.

use crate::option::{MigOption, OptionSet};
use serde::{Deserialize, Serialize};

/// Gateway name of the HTTP gateway.
pub const WEB_SERVICE_GATEWAY: &str = "WebServiceGateway";

/// Gateway name of the WebSocket gateway.
pub const WEB_SOCKET_GATEWAY: &str = "WebSocketGateway";

/// Gateway name of the raw TCP gateway.
pub const TCP_SOCKET_GATEWAY: &str = "TcpSocketGateway";

/// Main MIG configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transport gateways.
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,

    /// Backend interfaces.
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,

    /// Users for HTTP authentication.
    #[serde(default)]
    pub users: Vec<UserConfig>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateways: vec![
                GatewayConfig::new(WEB_SERVICE_GATEWAY)
                    .with_option("BaseUrl", "/")
                    .with_option("HomePath", "html")
                    .with_option("Host", "0.0.0.0")
                    .with_option("Port", "8080")
                    .with_option("Authentication", "None"),
                GatewayConfig::new(WEB_SOCKET_GATEWAY)
                    .with_option("Host", "0.0.0.0")
                    .with_option("Port", "8181"),
                GatewayConfig::new(TCP_SOCKET_GATEWAY)
                    .with_option("Host", "0.0.0.0")
                    .with_option("Port", "4646"),
            ],
            interfaces: Vec::new(),
            users: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// A gateway section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway name (`WebServiceGateway`, `WebSocketGateway`, `TcpSocketGateway`).
    pub name: String,

    /// Enable/disable.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Gateway options.
    #[serde(default)]
    pub options: Vec<MigOption>,
}

impl GatewayConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            options: Vec::new(),
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push(MigOption::new(name, value));
        self
    }

    /// Options collected into a set, later duplicates overriding earlier ones.
    pub fn option_set(&self) -> OptionSet {
        self.options.iter().cloned().collect()
    }
}

/// An interface (backend) section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface domain, e.g. `HomeAutomation.X10`.
    pub domain: String,

    /// Factory type name used to construct the interface.
    #[serde(rename = "type")]
    pub interface_type: String,

    /// Connect at startup.
    #[serde(default)]
    pub enabled: bool,

    /// Interface options.
    #[serde(default)]
    pub options: Vec<MigOption>,
}

impl InterfaceConfig {
    pub fn option_set(&self) -> OptionSet {
        self.options.iter().cloned().collect()
    }
}

/// An HTTP user. `password` holds the stored digest, see [`crate::credentials::password_digest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub password: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_three_gateways() {
        let config = Config::default();
        let names: Vec<&str> = config.gateways.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(
            names,
            vec![WEB_SERVICE_GATEWAY, WEB_SOCKET_GATEWAY, TCP_SOCKET_GATEWAY]
        );
        assert!(config.interfaces.is_empty());
    }

    #[test]
    fn test_log_level_default_is_info() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_str(), "warn");
    }

    #[test]
    fn test_gateway_option_set_last_wins() {
        let gateway = GatewayConfig::new("X")
            .with_option("Port", "1")
            .with_option("Port", "2");
        assert_eq!(gateway.option_set().value("Port"), "2");
    }
}
