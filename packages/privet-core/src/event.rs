//! Outbound notifications toward the front-end.

use crate::device::DeviceDescription;
use crate::registration::AccountEntry;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UiEvent {
    DeviceUpdate {
        name: String,
        domain: String,
        port: u16,
        ip: String,
        registered: bool,
    },
    DeviceRemoved {
        name: String,
    },
    RegistrationFailed {
        message: String,
    },
    RegistrationSuccess {
        #[serde(rename = "deviceId")]
        device_id: String,
    },
    InfoFailed {
        message: String,
    },
    InfoResult {
        payload: Value,
    },
    AccountsAvailable {
        accounts: Vec<AccountEntry>,
    },
}

impl UiEvent {
    pub fn device_update(description: &DeviceDescription) -> Self {
        UiEvent::DeviceUpdate {
            name: description.name.clone(),
            domain: description.address.host.clone(),
            port: description.address.port,
            ip: description.ip.clone().unwrap_or_default(),
            registered: description.is_registered(),
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<UiEvent>;

/// Emits [`UiEvent`]s to whoever renders them
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: UiEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::warn!("Failed to emit event, front-end is gone: {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostPort;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = UiEvent::RegistrationSuccess {
            device_id: "dev-42".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "registrationSuccess", "deviceId": "dev-42"})
        );

        let event = UiEvent::AccountsAvailable {
            accounts: vec![AccountEntry {
                index: -1,
                label: "carol".to_string(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "accountsAvailable", "accounts": [{"index": -1, "label": "carol"}]})
        );
    }

    #[test]
    fn test_device_update_from_description() {
        let description = DeviceDescription {
            name: "Printer1".to_string(),
            address: HostPort::new("printer1.local", 8080),
            ip: None,
            cloud_base_url: "https://cp.example".to_string(),
            claimed_id: Some("dev-1".to_string()),
        };
        assert_eq!(
            serde_json::to_value(UiEvent::device_update(&description)).unwrap(),
            json!({
                "event": "deviceUpdate",
                "name": "Printer1",
                "domain": "printer1.local",
                "port": 8080,
                "ip": "",
                "registered": true,
            })
        );
    }
}
