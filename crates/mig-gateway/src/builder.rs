//! Build a service from a configuration file.

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::http::auth::UserLookup;
use crate::http::WebServiceGateway;
use crate::service::MigService;
use crate::tcp::TcpSocketGateway;
use crate::websocket::WebSocketGateway;
use crate::Result;
use mig_core::config::{TCP_SOCKET_GATEWAY, WEB_SERVICE_GATEWAY, WEB_SOCKET_GATEWAY};
use mig_core::Config;
use mig_interfaces::InterfaceRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Create a service with the gateways and interfaces described by `config`.
///
/// Disabled gateways are skipped. Disabled interfaces are registered but not
/// connected on start. The service is returned stopped.
pub async fn build_service(config: &Config, registry: &InterfaceRegistry) -> Result<MigService> {
    config
        .validate()
        .map_err(|e| GatewayError::Config(e.to_string()))?;

    let service = MigService::new();
    let users = user_lookup(config);

    for section in &config.gateways {
        if !section.enabled {
            debug!(gateway = %section.name, "gateway disabled in configuration");
            continue;
        }

        let gateway: Arc<dyn Gateway> = match section.name.as_str() {
            WEB_SERVICE_GATEWAY => Arc::new(WebServiceGateway::with_user_lookup(users.clone())),
            WEB_SOCKET_GATEWAY => Arc::new(WebSocketGateway::new()),
            TCP_SOCKET_GATEWAY => Arc::new(TcpSocketGateway::new()),
            other => return Err(GatewayError::Config(format!("unknown gateway '{}'", other))),
        };
        service.add_gateway(gateway, section.option_set()).await?;
    }

    for section in &config.interfaces {
        let options = section.option_set();
        let interface = registry
            .create(&section.interface_type, &section.domain, &options)
            .await?;
        service
            .add_interface(interface, section.enabled, options)
            .await?;
    }

    info!(
        gateways = service.gateways().await.len(),
        interfaces = service.interfaces().await.len(),
        "service built from configuration"
    );
    Ok(service)
}

/// Lookup over the configured users' stored password digests.
pub fn user_lookup(config: &Config) -> UserLookup {
    let users: HashMap<String, String> = config
        .users
        .iter()
        .map(|u| (u.name.clone(), u.password.clone()))
        .collect();
    Arc::new(move |name: &str| users.get(name).cloned())
}
