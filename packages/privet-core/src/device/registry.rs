use super::{DeviceDescription, HostPort};
use std::collections::HashMap;

/// In-memory map of known devices keyed by name.
///
/// Only the controller task touches the registry, so lookups are always
/// against the latest discovery state.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceDescription>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the description for `description.name`
    pub fn upsert(&mut self, description: DeviceDescription) {
        self.devices.insert(description.name.clone(), description);
    }

    /// Forget a device; returns the removed description if it was known
    pub fn remove(&mut self, name: &str) -> Option<DeviceDescription> {
        self.devices.remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&DeviceDescription> {
        self.devices.get(name)
    }

    /// Last known address, or the default address for unknown devices
    pub fn address_of(&self, name: &str) -> HostPort {
        self.lookup(name)
            .map(|d| d.address.clone())
            .unwrap_or_default()
    }

    /// Cloud base URL, or an empty string for unknown devices
    pub fn cloud_base_url_of(&self, name: &str) -> String {
        self.lookup(name)
            .map(|d| d.cloud_base_url.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
