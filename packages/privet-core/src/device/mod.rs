//! Discovered devices.
//!
//! Descriptions arrive from a [`DeviceLister`] and are kept in the
//! [`DeviceRegistry`], which is the only authority on whether a device is
//! still present.

mod lister;
mod registry;

pub use lister::{DeviceLister, DiscoveryEvent, DiscoverySink, StaticDeviceLister};
pub use registry::DeviceRegistry;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host and port a device advertises its HTTP service on
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The default address has no host and can never be resolved
    pub fn is_unset(&self) -> bool {
        self.host.is_empty()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescription {
    pub name: String,
    pub address: HostPort,
    pub ip: Option<String>,
    /// Cloud service the device registers with
    pub cloud_base_url: String,
    /// Cloud id of the device once it has been claimed
    pub claimed_id: Option<String>,
}

impl DeviceDescription {
    pub fn is_registered(&self) -> bool {
        self.claimed_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}
