use super::{DeviceDescription, HostPort};
use crate::config::StaticDevice;
use crate::message::{Message, MessageSender};

/// Notification from the discovery transport
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Changed(DeviceDescription),
    Removed(String),
}

/// Where a lister posts its discovery events
#[derive(Debug, Clone)]
pub struct DiscoverySink {
    tx: MessageSender,
}

impl DiscoverySink {
    pub fn new(tx: MessageSender) -> Self {
        Self { tx }
    }

    pub fn changed(&self, description: DeviceDescription) {
        self.post(DiscoveryEvent::Changed(description));
    }

    pub fn removed(&self, name: impl Into<String>) {
        self.post(DiscoveryEvent::Removed(name.into()));
    }

    fn post(&self, event: DiscoveryEvent) {
        if self.tx.send(Message::Discovery(event)).is_err() {
            tracing::debug!("Controller stopped, dropping discovery event");
        }
    }
}

/// Source of device advertisements.
///
/// `start` is called once with the sink to report into; afterwards
/// `discover_new_devices` may be called any number of times.
pub trait DeviceLister: Send {
    fn start(&mut self, sink: DiscoverySink);
    fn discover_new_devices(&mut self, force: bool);
}

/// Lister backed by the `[[devices]]` entries of the config file
#[derive(Debug)]
pub struct StaticDeviceLister {
    devices: Vec<DeviceDescription>,
    sink: Option<DiscoverySink>,
}

impl StaticDeviceLister {
    pub fn new(devices: Vec<DeviceDescription>) -> Self {
        Self {
            devices,
            sink: None,
        }
    }

    /// Build descriptions from config entries, filling in the default cloud URL
    pub fn from_config(entries: &[StaticDevice], default_cloud_url: &str) -> Self {
        let devices = entries
            .iter()
            .map(|entry| DeviceDescription {
                name: entry.name.clone(),
                address: HostPort::new(entry.host.clone(), entry.port),
                ip: entry.ip.clone(),
                cloud_base_url: entry
                    .url
                    .clone()
                    .filter(|u| !u.is_empty())
                    .unwrap_or_else(|| default_cloud_url.to_string()),
                claimed_id: entry.id.clone().filter(|id| !id.is_empty()),
            })
            .collect();
        Self::new(devices)
    }

    pub fn devices(&self) -> &[DeviceDescription] {
        &self.devices
    }
}

impl DeviceLister for StaticDeviceLister {
    fn start(&mut self, sink: DiscoverySink) {
        tracing::info!("Static lister started with {} devices", self.devices.len());
        self.sink = Some(sink);
    }

    fn discover_new_devices(&mut self, force: bool) {
        let Some(sink) = &self.sink else {
            tracing::warn!("discover_new_devices called before start");
            return;
        };
        tracing::debug!("Announcing {} static devices (force: {})", self.devices.len(), force);
        for device in &self.devices {
            sink.changed(device.clone());
        }
    }
}
