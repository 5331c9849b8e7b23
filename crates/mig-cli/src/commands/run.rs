//! Run command: serve until Ctrl-C.

use mig_core::Config;
use mig_gateway::build_service;
use mig_interfaces::InterfaceRegistry;
use tracing::info;

/// Build the service from `config`, start it and stop it on Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let registry = InterfaceRegistry::with_builtin().await;
    let service = build_service(&config, &registry).await?;

    service.start().await?;
    for gateway in service.gateways().await {
        if let Some(addr) = gateway.local_addr() {
            info!(gateway = gateway.name(), %addr, "gateway ready");
        }
    }
    info!("MIG running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    service.stop().await?;
    Ok(())
}
