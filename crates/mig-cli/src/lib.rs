//! MIG command-line interface.

pub mod commands;

use clap::{Parser, Subcommand};
use mig_core::config::LoggingConfig;
use mig_core::{paths, Config, ConfigError};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MIG - multi interface gateway
#[derive(Parser)]
#[command(name = "mig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true, env = paths::CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateways and interfaces from the configuration
    Run,

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Print the stored password digest for a user
    Passwd(commands::passwd::PasswdArgs),

    /// Show version information
    Version,
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run => {
            let config = load_config(cli.config.as_deref())?;
            commands::run::run(config).await
        }
        Commands::Config(args) => commands::config::run(args, cli.config.as_deref()),
        Commands::Passwd(args) => {
            println!("{}", commands::passwd::digest(&args));
            Ok(())
        }
        Commands::Version => {
            println!("mig {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Configuration file location: `--config`, else `$MIG_CONFIG`, else `~/.mig/mig.json5`.
pub fn config_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => paths::config_file(),
    }
}

/// Load the configuration. An explicit path must exist; the default path
/// falls back to built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::load_or_default()),
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if logging.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_run_with_config() {
        let cli = Cli::try_parse_from(["mig", "run", "--config", "/tmp/mig.json5"]).unwrap();
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/mig.json5")));
    }

    #[test]
    fn test_parse_version_verbose() {
        let cli = Cli::try_parse_from(["mig", "-vv", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["mig", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(
                    args.command,
                    commands::config::ConfigCommand::Init { force: true }
                ));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_parse_passwd() {
        let cli = Cli::try_parse_from(["mig", "passwd", "admin", "secret", "--realm", "Home"]).unwrap();
        match cli.command {
            Commands::Passwd(args) => {
                assert_eq!(args.user, "admin");
                assert_eq!(args.password, "secret");
                assert_eq!(args.realm, "Home");
            }
            _ => panic!("Expected Passwd command"),
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["mig", "serve"]).is_err());
        assert!(Cli::try_parse_from(["mig", "passwd", "admin"]).is_err());
    }

    #[test]
    fn test_explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json5");
        assert!(matches!(
            load_config(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
        assert_eq!(config_path(Some(&missing)).unwrap(), missing);
    }
}
