//! Config save/load roundtrip integration tests.

use mig_core::config::{Config, InterfaceConfig, LogLevel, UserConfig, WEB_SERVICE_GATEWAY};
use mig_core::credentials::{password_digest, DEFAULT_REALM};
use mig_core::MigOption;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mig.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateways.len(), config.gateways.len());
    assert_eq!(
        loaded.gateway(WEB_SERVICE_GATEWAY).unwrap().option_set().value("Port"),
        "8080"
    );
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mig.json5");

    let mut config = Config::default();
    config.gateways[0]
        .options
        .push(MigOption::new("Authentication", "Digest"));
    config.interfaces.push(InterfaceConfig {
        domain: "HomeAutomation.Virtual".to_string(),
        interface_type: "virtual".to_string(),
        enabled: true,
        options: vec![MigOption::new("Modules", "1,2,3")],
    });
    config.users.push(UserConfig {
        name: "admin".to_string(),
        password: password_digest("admin", DEFAULT_REALM, "secret"),
    });
    config.logging.level = LogLevel::Debug;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(
        loaded.gateways[0].option_set().value("Authentication"),
        "Digest"
    );
    assert_eq!(loaded.interfaces[0].interface_type, "virtual");
    assert_eq!(
        loaded.user_password("admin"),
        Some(password_digest("admin", DEFAULT_REALM, "secret").as_str())
    );
    assert_eq!(loaded.logging.level, LogLevel::Debug);
}

#[test]
fn test_config_accepts_json5_syntax() {
    let config = Config::parse(
        r#"{
            // comments and trailing commas are fine
            gateways: [
                { name: 'TcpSocketGateway', options: [{ name: 'Port', value: '5000' }], },
            ],
        }"#,
    )
    .unwrap();
    assert_eq!(config.gateways.len(), 1);
    assert!(config.gateways[0].enabled);
    assert!(config.interfaces.is_empty());
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/mig.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}
