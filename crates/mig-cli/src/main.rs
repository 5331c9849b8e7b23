//! MIG CLI entry point.

use clap::Parser;
use mig_cli::{init_logging, load_config, run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the configuration file when it is readable
    let logging = load_config(cli.config.as_deref())
        .map(|config| config.logging)
        .unwrap_or_default();
    init_logging(&logging, cli.verbose);

    run(cli).await
}
