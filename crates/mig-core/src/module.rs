//! Addressable units exposed by interfaces.

use serde::{Deserialize, Serialize};

/// Kind of device or unit behind a module address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    #[default]
    Generic,
    Switch,
    Light,
    Dimmer,
    Color,
    Sensor,
    Temperature,
    Thermostat,
    DoorWindow,
    DoorLock,
    Shutter,
    Siren,
    Fan,
    MediaTransmitter,
    MediaReceiver,
}

/// A module enumerated by an interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceModule {
    pub domain: String,
    pub address: String,
    #[serde(rename = "ModuleType")]
    pub module_type: ModuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<serde_json::Value>,
}

impl InterfaceModule {
    pub fn new(domain: impl Into<String>, address: impl Into<String>, module_type: ModuleType) -> Self {
        Self {
            domain: domain.into(),
            address: address.into(),
            module_type,
            description: None,
            custom_data: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_custom_data(mut self, data: serde_json::Value) -> Self {
        self.custom_data = Some(data);
        self
    }
}
