//! Registration state machine.
//!
//! A session walks `ResolvingClient -> AwaitingClaimToken -> ... ->
//! Finalizing`. Each collaborator answer arrives as a [`RegistrationStep`]
//! tagged with the session that asked for it; answers for any other session
//! are dropped unread.

use super::accounts::{annotate_accounts, AccountChoice};
use crate::device::DeviceRegistry;
use crate::error::{DiscoveryError, FailureReason, ProtocolFailure};
use crate::event::{EventEmitter, UiEvent};
use crate::message::{Message, MessageSender, RegisterDelegate, RegistrationStep, Responder, SessionId};
use crate::ports::{
    AccountResolver, ConfirmFlow, ConfirmFlowFactory, ConfirmStatus, DeviceHttpClient,
    HttpClientFactory, IdentityProvider, RegisterOperation, ResolvedAccounts,
};
use std::sync::Arc;

/// Account index whose XSRF token is fetched when a session starts
const PRIMARY_USER_INDEX: u32 = 0;

/// Cloud endpoint that confirms a claim token
pub fn claim_url(cloud_base_url: &str, token: &str) -> String {
    format!("{}/confirm?token={}", cloud_base_url.trim_end_matches('/'), token)
}

/// Which confirmation call is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmPath {
    /// Bearer token of the signed-in identity
    OAuth,
    /// Cookie session of the primary account, token from session start
    PrimaryCookie,
    /// Cookie session of a secondary account, token fetched on demand
    SecondaryCookie,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    ResolvingClient,
    AwaitingClaimToken,
    /// Claim token received before the user picked an account
    AwaitingChoice { token: String },
    /// Primary account chosen before its XSRF token arrived
    AwaitingPrimaryToken { token: String },
    ResolvingSecondaryToken { claim_url: String, user_index: u32 },
    Confirming(ConfirmPath),
    /// Cloud confirmed; waiting for the device to report its id
    Finalizing,
}

#[derive(Debug, Clone)]
struct ChosenAccount {
    choice: AccountChoice,
    label: String,
}

// Field order is drop order: the confirm flow and register operation are
// released before the client they were created from.
struct Session {
    id: SessionId,
    confirm: Option<Box<dyn ConfirmFlow>>,
    operation: Option<Box<dyn RegisterOperation>>,
    client: Option<Box<dyn DeviceHttpClient>>,
    device_name: String,
    chosen: Option<ChosenAccount>,
    primary_xsrf: Option<String>,
    phase: Phase,
}

impl Session {
    fn new(id: SessionId, device_name: &str) -> Self {
        Self {
            id,
            confirm: None,
            operation: None,
            client: None,
            device_name: device_name.to_string(),
            chosen: None,
            primary_xsrf: None,
            phase: Phase::ResolvingClient,
        }
    }
}

fn responder<T: 'static>(
    tx: &MessageSender,
    session: SessionId,
    wrap: fn(T) -> RegistrationStep,
) -> Responder<T> {
    Responder::new(tx.clone(), move |value| Message::Registration {
        session,
        step: wrap(value),
    })
}

fn start_cookie_confirm(
    confirm: &dyn ConfirmFlowFactory,
    tx: &MessageSender,
    session: &mut Session,
    user_index: u32,
    xsrf_token: &str,
    claim_url: &str,
    path: ConfirmPath,
) {
    tracing::info!(
        "Confirming claim for '{}' with cookie account {}",
        session.device_name,
        user_index
    );
    let mut flow = confirm.cookie(
        user_index,
        xsrf_token,
        claim_url,
        responder(tx, session.id, RegistrationStep::Confirmed),
    );
    flow.start();
    session.confirm = Some(flow);
    session.phase = Phase::Confirming(path);
}

/// Drives at most one registration session at a time
pub struct RegistrationOrchestrator {
    http: Arc<dyn HttpClientFactory>,
    accounts: Arc<dyn AccountResolver>,
    confirm: Arc<dyn ConfirmFlowFactory>,
    identity: Arc<dyn IdentityProvider>,
    tx: MessageSender,
    events: EventEmitter,
    last_session: SessionId,
    session: Option<Session>,
}

impl RegistrationOrchestrator {
    pub fn new(
        http: Arc<dyn HttpClientFactory>,
        accounts: Arc<dyn AccountResolver>,
        confirm: Arc<dyn ConfirmFlowFactory>,
        identity: Arc<dyn IdentityProvider>,
        tx: MessageSender,
        events: EventEmitter,
    ) -> Self {
        Self {
            http,
            accounts,
            confirm,
            identity,
            tx,
            events,
            last_session: 0,
            session: None,
        }
    }

    /// Id of the live session, if any
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn phase(&self) -> Option<&Phase> {
        self.session.as_ref().map(|s| &s.phase)
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    /// Start registering `name`, replacing any session in flight
    pub fn register_device(&mut self, name: &str, registry: &DeviceRegistry) {
        if let Some(previous) = self.session.take() {
            tracing::info!(
                "Abandoning registration session {} for '{}'",
                previous.id,
                previous.device_name
            );
            drop(previous);
        }

        self.last_session += 1;
        let id = self.last_session;

        if registry.lookup(name).is_none() {
            tracing::warn!("Registering unknown device '{}', resolution will use an empty address", name);
        }
        let base_url = registry.cloud_base_url_of(name);
        let address = registry.address_of(name);

        tracing::info!("Starting registration session {} for '{}' at {}", id, name, address);
        self.session = Some(Session::new(id, name));

        self.accounts.resolve(
            &base_url,
            PRIMARY_USER_INDEX,
            responder(&self.tx, id, RegistrationStep::PrimaryAccounts),
        );
        self.http.create_client(
            name,
            &address,
            responder(&self.tx, id, RegistrationStep::ClientResolved),
        );
    }

    /// Record the account the user picked
    pub fn choose_user(&mut self, choice: AccountChoice, label: &str, registry: &DeviceRegistry) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("Account chosen with no registration in progress");
            return;
        };

        match &session.phase {
            Phase::ResolvingClient | Phase::AwaitingClaimToken | Phase::AwaitingChoice { .. } => {}
            phase => {
                tracing::warn!("Ignoring account choice in phase {:?}", phase);
                return;
            }
        }

        tracing::info!(
            "Session {} will confirm as account {} ('{}')",
            session.id,
            choice.index(),
            label
        );
        session.chosen = Some(ChosenAccount {
            choice,
            label: label.to_string(),
        });

        if let Phase::AwaitingChoice { token } = &session.phase {
            let token = token.clone();
            self.claim(token, registry);
        }
    }

    pub fn handle_step(&mut self, session: SessionId, step: RegistrationStep, registry: &DeviceRegistry) {
        if self.session_id() != Some(session) {
            tracing::debug!("Discarding stale {} for session {}", step.kind(), session);
            return;
        }

        match step {
            RegistrationStep::ClientResolved(client) => self.on_client_resolved(client),
            RegistrationStep::PrimaryAccounts(resolved) => self.on_primary_accounts(resolved, registry),
            RegistrationStep::SecondaryToken(resolved) => self.on_secondary_token(resolved),
            RegistrationStep::ClaimToken { token, url_hint } => {
                self.on_claim_token(token, url_hint, registry)
            }
            RegistrationStep::ProtocolError(failure) => {
                self.fail(DiscoveryError::Protocol(failure))
            }
            RegistrationStep::Done { device_id } => self.on_done(device_id),
            RegistrationStep::Confirmed(status) => self.on_confirmed(status),
        }
    }

    fn on_client_resolved(&mut self, client: Option<Box<dyn DeviceHttpClient>>) {
        let Some(client) = client else {
            return self.fail(DiscoveryError::Resolution);
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.phase != Phase::ResolvingClient {
            tracing::warn!("Unexpected client resolution in phase {:?}", session.phase);
            return;
        }

        let user = session
            .chosen
            .as_ref()
            .map(|c| c.label.clone())
            .filter(|label| !label.is_empty())
            .or_else(|| self.identity.signed_in_account())
            .unwrap_or_default();

        tracing::debug!("Resolved client for '{}', starting register as '{}'", client.name(), user);
        let mut operation =
            client.create_register_operation(&user, RegisterDelegate::new(session.id, self.tx.clone()));
        operation.start();

        session.client = Some(client);
        session.operation = Some(operation);
        session.phase = Phase::AwaitingClaimToken;
    }

    fn on_primary_accounts(&mut self, resolved: ResolvedAccounts, registry: &DeviceRegistry) {
        let signed_in = self.identity.signed_in_account();
        let accounts = annotate_accounts(&resolved.accounts, signed_in.as_deref());
        tracing::debug!("{} accounts available for registration", accounts.len());
        self.events.emit(UiEvent::AccountsAvailable { accounts });

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.primary_xsrf = Some(resolved.xsrf_token);

        if let Phase::AwaitingPrimaryToken { token } = &session.phase {
            let token = token.clone();
            self.claim(token, registry);
        }
    }

    fn on_claim_token(&mut self, token: String, url_hint: Option<String>, registry: &DeviceRegistry) {
        match self.phase() {
            Some(Phase::AwaitingClaimToken) | Some(Phase::AwaitingChoice { .. }) => {}
            phase => {
                tracing::debug!("Ignoring claim token in phase {:?}", phase);
                return;
            }
        }
        tracing::debug!("Received claim token (device hint: {:?})", url_hint);
        self.claim(token, registry);
    }

    /// Turn a claim token into a confirmation call for the chosen account
    fn claim(&mut self, token: String, registry: &DeviceRegistry) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(device) = registry.lookup(&session.device_name) else {
            return self.fail(DiscoveryError::DeviceGone);
        };
        let claim_url = claim_url(&device.cloud_base_url, &token);

        let Some(choice) = session.chosen.as_ref().map(|c| c.choice) else {
            tracing::info!("Claim token ready for '{}', waiting for account choice", session.device_name);
            session.phase = Phase::AwaitingChoice { token };
            return;
        };

        match choice {
            AccountChoice::Identity => {
                let Some(provider) = self.identity.token_provider() else {
                    return self.fail(DiscoveryError::IdentityUnavailable);
                };
                tracing::info!("Confirming claim for '{}' with signed-in identity", session.device_name);
                let mut flow = self.confirm.bearer(
                    provider,
                    &claim_url,
                    responder(&self.tx, session.id, RegistrationStep::Confirmed),
                );
                flow.start();
                session.confirm = Some(flow);
                session.phase = Phase::Confirming(ConfirmPath::OAuth);
            }
            AccountChoice::Cookie(PRIMARY_USER_INDEX) => match session.primary_xsrf.clone() {
                Some(xsrf_token) => start_cookie_confirm(
                    self.confirm.as_ref(),
                    &self.tx,
                    session,
                    PRIMARY_USER_INDEX,
                    &xsrf_token,
                    &claim_url,
                    ConfirmPath::PrimaryCookie,
                ),
                None => {
                    tracing::debug!("Primary XSRF token not yet known, waiting for accounts");
                    session.phase = Phase::AwaitingPrimaryToken { token };
                }
            },
            AccountChoice::Cookie(user_index) => {
                tracing::debug!("Fetching XSRF token for account {}", user_index);
                self.accounts.resolve(
                    &device.cloud_base_url,
                    user_index,
                    responder(&self.tx, session.id, RegistrationStep::SecondaryToken),
                );
                session.phase = Phase::ResolvingSecondaryToken {
                    claim_url,
                    user_index,
                };
            }
        }
    }

    fn on_secondary_token(&mut self, resolved: ResolvedAccounts) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Phase::ResolvingSecondaryToken {
            claim_url,
            user_index,
        } = session.phase.clone()
        else {
            tracing::debug!("Ignoring secondary XSRF token in phase {:?}", session.phase);
            return;
        };

        start_cookie_confirm(
            self.confirm.as_ref(),
            &self.tx,
            session,
            user_index,
            &resolved.xsrf_token,
            &claim_url,
            ConfirmPath::SecondaryCookie,
        );
    }

    fn on_confirmed(&mut self, status: ConfirmStatus) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Phase::Confirming(path) = session.phase else {
            tracing::debug!("Ignoring confirm result in phase {:?}", session.phase);
            return;
        };

        if status != ConfirmStatus::Success {
            return self.fail(DiscoveryError::Confirm);
        }

        tracing::info!("Cloud confirmed claim for '{}' via {:?}", session.device_name, path);
        session.confirm = None;
        let Some(operation) = session.operation.as_mut() else {
            tracing::error!("Confirmed session {} has no register operation", session.id);
            return self.fail(DiscoveryError::Confirm);
        };
        operation.complete_registration();
        session.phase = Phase::Finalizing;
    }

    fn on_done(&mut self, device_id: String) {
        if self.phase() != Some(&Phase::Finalizing) {
            tracing::warn!("Device reported done before the claim was confirmed");
            return self.fail(DiscoveryError::Protocol(ProtocolFailure::new(
                "complete",
                FailureReason::MalformedResponse,
            )));
        }

        if let Some(session) = self.session.take() {
            tracing::info!("Registered '{}' as {}", session.device_name, device_id);
            drop(session);
        }
        self.events.emit(UiEvent::RegistrationSuccess { device_id });
    }

    /// Terminate the session; resources go before the failure is reported
    fn fail(&mut self, error: DiscoveryError) {
        if let Some(session) = self.session.take() {
            match &error {
                DiscoveryError::Protocol(failure) => tracing::error!(
                    "Registration of '{}' failed: action={} reason={:?} http_code={:?} detail={:?}",
                    session.device_name,
                    failure.action,
                    failure.reason,
                    failure.http_code,
                    failure.detail
                ),
                other => tracing::error!("Registration of '{}' failed: {}", session.device_name, other),
            }
            drop(session);
        }
        self.events.emit(UiEvent::RegistrationFailed {
            message: error.to_string(),
        });
    }
}
