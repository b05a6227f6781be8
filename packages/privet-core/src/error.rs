//! Error taxonomy for discovery, registration and info flows.
//!
//! The `Display` text of each variant is the message shown to the user in the
//! `registrationFailed` / `infoFailed` events.

use serde::Serialize;
use serde_json::Value;

/// Why a device-local register action failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The device could not be reached
    Network,
    /// The device answered with a non-success HTTP status
    HttpError,
    /// The response body was not JSON
    JsonError,
    /// The response was JSON but missing required fields
    MalformedResponse,
    /// The device rejected or could not issue a privet token
    Token,
    /// The device reported a protocol error in its response body
    Device,
}

/// Failure reported by a register operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolFailure {
    pub action: String,
    pub reason: FailureReason,
    pub http_code: Option<u16>,
    pub detail: Option<Value>,
}

impl ProtocolFailure {
    pub fn new(action: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            action: action.into(),
            reason,
            http_code: None,
            detail: None,
        }
    }

    pub fn with_http_code(mut self, code: u16) -> Self {
        self.http_code = Some(code);
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiscoveryError {
    /// No HTTP client could be obtained for the device
    #[error("Resolution failed")]
    Resolution,

    /// The device vanished from the registry mid-flow
    #[error("Device no longer exists")]
    DeviceGone,

    /// No token provider for the signed-in identity
    #[error("Could not get token service")]
    IdentityUnavailable,

    /// Cloud confirmation failed or returned non-success
    #[error("Confirm error")]
    Confirm,

    /// The device-local registration protocol failed
    #[error("Registration error")]
    Protocol(ProtocolFailure),

    /// Info query came back with a non-OK status or no payload
    #[error("HTTP error {0}")]
    InfoHttp(u16),

    /// Inbound command failed argument validation
    #[error("Malformed command: {0}")]
    MalformedCommand(String),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
