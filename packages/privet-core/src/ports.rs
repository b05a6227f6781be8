//! Contracts of the external collaborators the controller drives.
//!
//! Nothing here blocks: every request returns immediately and the answer is
//! delivered later through a [`Responder`] or [`RegisterDelegate`]. Handles
//! returned by the factories are owned by the caller; dropping a handle
//! releases it and cancels whatever work it still has in flight.

use crate::device::{DeviceLister, HostPort};
use crate::message::{RegisterDelegate, Responder};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Resolves a device name and address into a device-scoped HTTP client
pub trait HttpClientFactory: Send + Sync {
    /// The responder receives `None` when the device cannot be resolved
    fn create_client(
        &self,
        name: &str,
        address: &HostPort,
        responder: Responder<Option<Box<dyn DeviceHttpClient>>>,
    );
}

/// HTTP client bound to one device
pub trait DeviceHttpClient: Send {
    fn name(&self) -> &str;

    /// Operations are created idle and must be `start`ed by the caller
    fn create_register_operation(
        &self,
        user: &str,
        delegate: RegisterDelegate,
    ) -> Box<dyn RegisterOperation>;

    fn create_info_operation(&self, responder: Responder<InfoResponse>) -> Box<dyn InfoOperation>;
}

/// Device-local registration protocol.
///
/// After `start`, the delegate sees any number of `on_claim_token` calls and
/// then exactly one of `on_protocol_error` or, once `complete_registration`
/// has been called, `on_done`.
pub trait RegisterOperation: Send {
    fn start(&mut self);
    fn complete_registration(&mut self);
}

pub trait InfoOperation: Send {
    fn start(&mut self);
}

/// Outcome of an info operation
#[derive(Debug, Clone, PartialEq)]
pub struct InfoResponse {
    pub http_code: u16,
    pub payload: Option<Value>,
}

/// Cookie-session cloud accounts known to the browser profile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccounts {
    pub accounts: Vec<String>,
    /// XSRF token of the account the resolve call was scoped to
    pub xsrf_token: String,
}

/// Lists cloud accounts and fetches an anti-forgery token for one of them
pub trait AccountResolver: Send + Sync {
    /// Answers exactly once per call
    fn resolve(&self, base_url: &str, user_index: u32, responder: Responder<ResolvedAccounts>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmStatus {
    Success,
    Failure,
}

/// Cloud-side claim confirmation call
pub trait ConfirmFlow: Send {
    fn start(&mut self);
}

pub trait ConfirmFlowFactory: Send + Sync {
    /// Confirm using the signed-in identity's access token
    fn bearer(
        &self,
        provider: Arc<dyn TokenProvider>,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow>;

    /// Confirm on behalf of a cookie-session account
    fn cookie(
        &self,
        user_index: u32,
        xsrf_token: &str,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow>;
}

/// Supplies OAuth access tokens for the signed-in identity
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> BoxFuture<'static, anyhow::Result<String>>;
}

/// The identity the host application is signed in with
pub trait IdentityProvider: Send + Sync {
    fn signed_in_account(&self) -> Option<String>;
    fn token_provider(&self) -> Option<Arc<dyn TokenProvider>>;
}

/// Everything the controller needs from the outside world
pub struct Collaborators {
    pub lister: Box<dyn DeviceLister>,
    pub http: Arc<dyn HttpClientFactory>,
    pub accounts: Arc<dyn AccountResolver>,
    pub confirm: Arc<dyn ConfirmFlowFactory>,
    pub identity: Arc<dyn IdentityProvider>,
}
