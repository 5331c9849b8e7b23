//! Interface factory registry.

use crate::error::InterfaceError;
use crate::traits::{InterfaceFactory, MigInterface};
use crate::virtual_device::VirtualInterfaceFactory;
use crate::Result;
use mig_core::OptionSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry of interface factories by type name.
pub struct InterfaceRegistry {
    factories: RwLock<HashMap<String, Arc<dyn InterfaceFactory>>>,
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry with the factories shipped in this crate.
    pub async fn with_builtin() -> Self {
        let registry = Self::new();
        registry
            .register_factory(Arc::new(VirtualInterfaceFactory))
            .await;
        registry
    }

    /// Register a factory, replacing any factory with the same type name.
    pub async fn register_factory(&self, factory: Arc<dyn InterfaceFactory>) {
        let mut factories = self.factories.write().await;
        let interface_type = factory.interface_type().to_string();
        info!("Registering factory for interface type: {}", interface_type);
        factories.insert(interface_type, factory);
    }

    /// Build an interface of `interface_type` for `domain`.
    pub async fn create(
        &self,
        interface_type: &str,
        domain: &str,
        options: &OptionSet,
    ) -> Result<Arc<dyn MigInterface>> {
        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(interface_type)
                .cloned()
                .ok_or_else(|| InterfaceError::UnknownType(interface_type.to_string()))?
        };

        debug!(interface_type, domain, "creating interface");
        factory.create(domain, options).await
    }

    /// Registered type names, sorted.
    pub async fn types(&self) -> Vec<String> {
        let factories = self.factories.read().await;
        let mut types: Vec<String> = factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn contains(&self, interface_type: &str) -> bool {
        self.factories.read().await.contains_key(interface_type)
    }
}
