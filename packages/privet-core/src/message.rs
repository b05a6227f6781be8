//! Messages consumed by the controller task.
//!
//! Every collaborator reports back by posting a [`Message`] into the
//! controller's channel. Registration completions are tagged with the session
//! that issued the request so that answers for a replaced session can be
//! recognised and dropped.

use crate::command::Command;
use crate::device::DiscoveryEvent;
use crate::error::ProtocolFailure;
use crate::ports::{ConfirmStatus, DeviceHttpClient, InfoResponse, ResolvedAccounts};
use std::fmt;
use tokio::sync::mpsc;

/// Generation tag of a registration session
pub type SessionId = u64;

/// Identity of a single info query
pub type QueryId = u64;

pub type MessageSender = mpsc::UnboundedSender<Message>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

pub fn channel() -> (MessageSender, MessageReceiver) {
    mpsc::unbounded_channel()
}

pub enum Message {
    /// Validated command from the front-end
    Command(Command),
    /// Device appeared, changed or went away
    Discovery(DiscoveryEvent),
    /// Background poller asks for a discovery refresh
    Poll { force: bool },
    Registration {
        session: SessionId,
        step: RegistrationStep,
    },
    Info {
        query: QueryId,
        step: InfoStep,
    },
    /// Stop the controller loop
    Shutdown,
}

/// Completions that drive the registration state machine
pub enum RegistrationStep {
    ClientResolved(Option<Box<dyn DeviceHttpClient>>),
    /// Answer to the resolver call made when the session started
    PrimaryAccounts(ResolvedAccounts),
    /// Answer to the resolver call scoped to a secondary account
    SecondaryToken(ResolvedAccounts),
    ClaimToken {
        token: String,
        url_hint: Option<String>,
    },
    ProtocolError(ProtocolFailure),
    Done {
        device_id: String,
    },
    Confirmed(ConfirmStatus),
}

impl RegistrationStep {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationStep::ClientResolved(_) => "client_resolved",
            RegistrationStep::PrimaryAccounts(_) => "primary_accounts",
            RegistrationStep::SecondaryToken(_) => "secondary_token",
            RegistrationStep::ClaimToken { .. } => "claim_token",
            RegistrationStep::ProtocolError(_) => "protocol_error",
            RegistrationStep::Done { .. } => "done",
            RegistrationStep::Confirmed(_) => "confirmed",
        }
    }
}

pub enum InfoStep {
    ClientResolved(Option<Box<dyn DeviceHttpClient>>),
    Done(InfoResponse),
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Message::Discovery(event) => f.debug_tuple("Discovery").field(event).finish(),
            Message::Poll { force } => f.debug_struct("Poll").field("force", force).finish(),
            Message::Shutdown => f.write_str("Shutdown"),
            Message::Registration { session, step } => f
                .debug_struct("Registration")
                .field("session", session)
                .field("step", &step.kind())
                .finish(),
            Message::Info { query, step } => f
                .debug_struct("Info")
                .field("query", query)
                .field(
                    "step",
                    &match step {
                        InfoStep::ClientResolved(_) => "client_resolved",
                        InfoStep::Done(_) => "done",
                    },
                )
                .finish(),
        }
    }
}

/// One-shot reply slot handed to a collaborator.
///
/// The value is wrapped into the message the controller expects and posted
/// into its channel. If the controller is gone the reply is dropped.
pub struct Responder<T> {
    tx: MessageSender,
    wrap: Box<dyn FnOnce(T) -> Message + Send>,
}

impl<T> Responder<T> {
    pub fn new(tx: MessageSender, wrap: impl FnOnce(T) -> Message + Send + 'static) -> Self {
        Self {
            tx,
            wrap: Box::new(wrap),
        }
    }

    pub fn respond(self, value: T) {
        if self.tx.send((self.wrap)(value)).is_err() {
            tracing::debug!("Controller stopped, dropping collaborator reply");
        }
    }
}

impl<T> fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder").finish_non_exhaustive()
    }
}

/// Receives the callbacks of a register operation on behalf of one session
#[derive(Debug, Clone)]
pub struct RegisterDelegate {
    session: SessionId,
    tx: MessageSender,
}

impl RegisterDelegate {
    pub fn new(session: SessionId, tx: MessageSender) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn on_claim_token(&self, token: impl Into<String>, url_hint: Option<String>) {
        self.post(RegistrationStep::ClaimToken {
            token: token.into(),
            url_hint,
        });
    }

    pub fn on_protocol_error(&self, failure: ProtocolFailure) {
        self.post(RegistrationStep::ProtocolError(failure));
    }

    pub fn on_done(&self, device_id: impl Into<String>) {
        self.post(RegistrationStep::Done {
            device_id: device_id.into(),
        });
    }

    fn post(&self, step: RegistrationStep) {
        let message = Message::Registration {
            session: self.session,
            step,
        };
        if self.tx.send(message).is_err() {
            tracing::debug!("Controller stopped, dropping register callback");
        }
    }
}
