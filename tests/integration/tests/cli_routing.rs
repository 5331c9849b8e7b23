//! CLI argument surface and command routing tests.

use clap::Parser;
use mig_cli::commands::config::{init, ConfigCommand};
use mig_cli::commands::passwd;
use mig_cli::{load_config, Cli, Commands};
use mig_core::credentials::DEFAULT_REALM;
use tempfile::TempDir;

#[test]
fn test_help_lists_commands() {
    let err = match Cli::try_parse_from(["mig", "--help"]) {
        Ok(_) => panic!("--help should short-circuit parsing"),
        Err(err) => err,
    };
    let help = err.to_string();
    for command in ["run", "config", "passwd", "version"] {
        assert!(help.contains(command), "help should mention '{}'", command);
    }
}

#[test]
fn test_config_flag_is_global() {
    let cli = Cli::try_parse_from(["mig", "config", "show", "--config", "custom.json5"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config(ref args) if matches!(args.command, ConfigCommand::Show)
    ));
    assert_eq!(cli.config.unwrap().to_str(), Some("custom.json5"));
}

#[test]
fn test_passwd_defaults_to_gateway_realm() {
    let cli = Cli::try_parse_from(["mig", "passwd", "admin", "secret"]).unwrap();
    let Commands::Passwd(args) = cli.command else {
        panic!("Expected Passwd command");
    };
    assert_eq!(args.realm, DEFAULT_REALM);
    assert_eq!(passwd::digest(&args).len(), 32);
}

#[tokio::test]
async fn test_run_config_init_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mig.json5");

    init(&path, false).unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert!(config.validate().is_ok());

    let cli = Cli::try_parse_from(["mig", "config", "validate", "--config", path.to_str().unwrap()])
        .unwrap();
    mig_cli::run(cli).await.unwrap();
}
