//! Hand-written collaborators for driving the controller synchronously.
//!
//! Every call a mock receives is appended to a shared call log, including
//! handle drops, and every reply slot is parked so a test can answer it when
//! it chooses. The [`Harness`] feeds posted messages back into the controller
//! until the channel is empty.

use crate::command::Command;
use crate::controller::LocalDiscoveryController;
use crate::device::{DeviceDescription, DeviceLister, DiscoveryEvent, DiscoverySink, HostPort};
use crate::event::{EventEmitter, EventReceiver, UiEvent};
use crate::message::{channel, Message, MessageReceiver, MessageSender, RegisterDelegate, Responder};
use crate::ports::{
    AccountResolver, Collaborators, ConfirmFlow, ConfirmFlowFactory, ConfirmStatus,
    DeviceHttpClient, HttpClientFactory, IdentityProvider, InfoOperation, InfoResponse,
    RegisterOperation, ResolvedAccounts, TokenProvider,
};
use crate::visibility::VisibilityCounter;
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type ClientResponder = Responder<Option<Box<dyn DeviceHttpClient>>>;

#[derive(Default)]
struct Parked {
    clients: VecDeque<ClientResponder>,
    accounts: VecDeque<(u32, Responder<ResolvedAccounts>)>,
    confirms: VecDeque<Responder<ConfirmStatus>>,
    infos: VecDeque<Responder<InfoResponse>>,
    delegates: Vec<RegisterDelegate>,
}

/// Shared call log and parked reply slots
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
    parked: Arc<Mutex<Parked>>,
}

impl Recorder {
    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }

    fn park(&self, f: impl FnOnce(&mut Parked)) {
        f(&mut self.parked.lock().unwrap());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Position of the first call starting with `prefix`
    pub(crate) fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub(crate) fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    pub(crate) fn delegate(&self, index: usize) -> RegisterDelegate {
        self.parked.lock().unwrap().delegates[index].clone()
    }

    pub(crate) fn latest_delegate(&self) -> RegisterDelegate {
        let parked = self.parked.lock().unwrap();
        parked.delegates.last().cloned().expect("no register operation created")
    }

    fn next_client(&self) -> ClientResponder {
        self.parked.lock().unwrap().clients.pop_front().expect("no client request pending")
    }

    fn next_accounts(&self) -> (u32, Responder<ResolvedAccounts>) {
        self.parked.lock().unwrap().accounts.pop_front().expect("no account request pending")
    }

    fn next_confirm(&self) -> Responder<ConfirmStatus> {
        self.parked.lock().unwrap().confirms.pop_front().expect("no confirm pending")
    }

    fn next_info(&self) -> Responder<InfoResponse> {
        self.parked.lock().unwrap().infos.pop_front().expect("no info operation pending")
    }

    pub(crate) fn pending_clients(&self) -> usize {
        self.parked.lock().unwrap().clients.len()
    }

    pub(crate) fn pending_accounts(&self) -> usize {
        self.parked.lock().unwrap().accounts.len()
    }

    pub(crate) fn pending_confirms(&self) -> usize {
        self.parked.lock().unwrap().confirms.len()
    }
}

pub(crate) struct MockLister {
    rec: Recorder,
    _sink: Option<DiscoverySink>,
}

impl DeviceLister for MockLister {
    fn start(&mut self, sink: DiscoverySink) {
        self.rec.record("lister_start");
        self._sink = Some(sink);
    }

    fn discover_new_devices(&mut self, force: bool) {
        self.rec.record(format!("discover:{}", force));
    }
}

pub(crate) struct MockHttpFactory {
    rec: Recorder,
}

impl HttpClientFactory for MockHttpFactory {
    fn create_client(&self, name: &str, address: &HostPort, responder: ClientResponder) {
        self.rec.record(format!("create_client:{}@{}", name, address));
        self.rec.park(|p| p.clients.push_back(responder));
    }
}

pub(crate) struct MockClient {
    name: String,
    rec: Recorder,
}

impl DeviceHttpClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_register_operation(
        &self,
        user: &str,
        delegate: RegisterDelegate,
    ) -> Box<dyn RegisterOperation> {
        self.rec.record(format!("register_op:{}", user));
        self.rec.park(|p| p.delegates.push(delegate));
        Box::new(MockRegisterOp {
            rec: self.rec.clone(),
        })
    }

    fn create_info_operation(&self, responder: Responder<InfoResponse>) -> Box<dyn InfoOperation> {
        self.rec.record("info_op");
        self.rec.park(|p| p.infos.push_back(responder));
        Box::new(MockInfoOp {
            rec: self.rec.clone(),
        })
    }
}

impl Drop for MockClient {
    fn drop(&mut self) {
        self.rec.record(format!("drop_client:{}", self.name));
    }
}

struct MockRegisterOp {
    rec: Recorder,
}

impl RegisterOperation for MockRegisterOp {
    fn start(&mut self) {
        self.rec.record("register_start");
    }

    fn complete_registration(&mut self) {
        self.rec.record("complete_registration");
    }
}

impl Drop for MockRegisterOp {
    fn drop(&mut self) {
        self.rec.record("drop_register_op");
    }
}

struct MockInfoOp {
    rec: Recorder,
}

impl InfoOperation for MockInfoOp {
    fn start(&mut self) {
        self.rec.record("info_start");
    }
}

impl Drop for MockInfoOp {
    fn drop(&mut self) {
        self.rec.record("drop_info_op");
    }
}

pub(crate) struct MockAccountResolver {
    rec: Recorder,
}

impl AccountResolver for MockAccountResolver {
    fn resolve(&self, base_url: &str, user_index: u32, responder: Responder<ResolvedAccounts>) {
        self.rec.record(format!("resolve:{}:{}", base_url, user_index));
        self.rec.park(|p| p.accounts.push_back((user_index, responder)));
    }
}

pub(crate) struct MockConfirmFactory {
    rec: Recorder,
}

impl MockConfirmFactory {
    fn flow(&self, responder: Responder<ConfirmStatus>) -> Box<dyn ConfirmFlow> {
        self.rec.park(|p| p.confirms.push_back(responder));
        Box::new(MockConfirmFlow {
            rec: self.rec.clone(),
        })
    }
}

impl ConfirmFlowFactory for MockConfirmFactory {
    fn bearer(
        &self,
        _provider: Arc<dyn TokenProvider>,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow> {
        self.rec.record(format!("confirm_bearer:{}", claim_url));
        self.flow(responder)
    }

    fn cookie(
        &self,
        user_index: u32,
        xsrf_token: &str,
        claim_url: &str,
        responder: Responder<ConfirmStatus>,
    ) -> Box<dyn ConfirmFlow> {
        self.rec
            .record(format!("confirm_cookie:{}:{}:{}", user_index, xsrf_token, claim_url));
        self.flow(responder)
    }
}

struct MockConfirmFlow {
    rec: Recorder,
}

impl ConfirmFlow for MockConfirmFlow {
    fn start(&mut self) {
        self.rec.record("confirm_start");
    }
}

impl Drop for MockConfirmFlow {
    fn drop(&mut self) {
        self.rec.record("drop_confirm");
    }
}

struct MockTokenProvider;

impl TokenProvider for MockTokenProvider {
    fn access_token(&self) -> BoxFuture<'static, anyhow::Result<String>> {
        futures::future::ready(Ok("mock-token".to_string())).boxed()
    }
}

/// Signed-in identity with or without a usable token
pub(crate) struct MockIdentity {
    account: Option<String>,
    has_token: bool,
}

impl MockIdentity {
    pub(crate) fn signed_in(account: &str) -> Self {
        Self {
            account: Some(account.to_string()),
            has_token: true,
        }
    }

    pub(crate) fn without_token(account: &str) -> Self {
        Self {
            account: Some(account.to_string()),
            has_token: false,
        }
    }

    pub(crate) fn signed_out() -> Self {
        Self {
            account: None,
            has_token: false,
        }
    }
}

impl IdentityProvider for MockIdentity {
    fn signed_in_account(&self) -> Option<String> {
        self.account.clone()
    }

    fn token_provider(&self) -> Option<Arc<dyn TokenProvider>> {
        self.has_token
            .then(|| Arc::new(MockTokenProvider) as Arc<dyn TokenProvider>)
    }
}

pub(crate) fn device(name: &str, cloud_base_url: &str) -> DeviceDescription {
    DeviceDescription {
        name: name.to_string(),
        address: HostPort::new(format!("{}.local", name.to_lowercase()), 8080),
        ip: Some("192.168.1.20".to_string()),
        cloud_base_url: cloud_base_url.to_string(),
        claimed_id: None,
    }
}

/// Mock HTTP, account, confirm and identity collaborators around `lister`
pub(crate) fn mock_collaborators(
    rec: &Recorder,
    lister: Box<dyn DeviceLister>,
    identity: MockIdentity,
) -> Collaborators {
    Collaborators {
        lister,
        http: Arc::new(MockHttpFactory { rec: rec.clone() }),
        accounts: Arc::new(MockAccountResolver { rec: rec.clone() }),
        confirm: Arc::new(MockConfirmFactory { rec: rec.clone() }),
        identity: Arc::new(identity),
    }
}

/// Controller wired to mocks, driven one message at a time
pub(crate) struct Harness {
    pub(crate) controller: LocalDiscoveryController,
    pub(crate) rec: Recorder,
    pub(crate) counter: &'static VisibilityCounter,
    tx: MessageSender,
    rx: MessageReceiver,
    events: EventReceiver,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_identity(MockIdentity::signed_in("carol@example.com"))
    }

    pub(crate) fn with_identity(identity: MockIdentity) -> Self {
        let rec = Recorder::default();
        let (tx, rx) = channel();
        let (emitter, events) = EventEmitter::channel();
        // Each harness gets its own counter so parallel tests do not interfere
        let counter: &'static VisibilityCounter = Box::leak(Box::new(VisibilityCounter::new()));

        let lister = Box::new(MockLister {
            rec: rec.clone(),
            _sink: None,
        });
        let collaborators = mock_collaborators(&rec, lister, identity);
        let controller =
            LocalDiscoveryController::with_visibility_counter(collaborators, tx.clone(), emitter, counter);

        Self {
            controller,
            rec,
            counter,
            tx,
            rx,
            events,
        }
    }

    /// Deliver every queued message
    pub(crate) fn pump(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.controller.handle(message);
        }
    }

    pub(crate) fn post(&mut self, message: Message) {
        self.tx.send(message).unwrap();
        self.pump();
    }

    pub(crate) fn command(&mut self, command: Command) {
        self.post(Message::Command(command));
    }

    pub(crate) fn events(&mut self) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub(crate) fn add_device(&mut self, description: DeviceDescription) {
        self.post(Message::Discovery(DiscoveryEvent::Changed(description)));
    }

    pub(crate) fn remove_device(&mut self, name: &str) {
        self.post(Message::Discovery(DiscoveryEvent::Removed(name.to_string())));
    }

    pub(crate) fn register(&mut self, name: &str) {
        self.command(Command::RegisterDevice {
            name: name.to_string(),
        });
    }

    pub(crate) fn choose(&mut self, index: i64, label: &str) {
        let choice = crate::registration::AccountChoice::from_index(index).unwrap();
        self.command(Command::ChooseUser {
            choice,
            label: label.to_string(),
        });
    }

    /// Answer the oldest client request
    pub(crate) fn resolve_client(&mut self, name: &str, found: bool) {
        let client = found.then(|| {
            Box::new(MockClient {
                name: name.to_string(),
                rec: self.rec.clone(),
            }) as Box<dyn DeviceHttpClient>
        });
        self.rec.next_client().respond(client);
        self.pump();
    }

    /// Answer the oldest account request; returns the user index it asked for
    pub(crate) fn answer_accounts(&mut self, accounts: &[&str], xsrf_token: &str) -> u32 {
        let (user_index, responder) = self.rec.next_accounts();
        responder.respond(ResolvedAccounts {
            accounts: accounts.iter().map(|a| a.to_string()).collect(),
            xsrf_token: xsrf_token.to_string(),
        });
        self.pump();
        user_index
    }

    pub(crate) fn claim_token(&mut self, token: &str) {
        self.rec.latest_delegate().on_claim_token(token, None);
        self.pump();
    }

    pub(crate) fn confirm(&mut self, status: ConfirmStatus) {
        self.rec.next_confirm().respond(status);
        self.pump();
    }

    pub(crate) fn device_done(&mut self, device_id: &str) {
        self.rec.latest_delegate().on_done(device_id);
        self.pump();
    }

    pub(crate) fn answer_info(&mut self, http_code: u16, payload: Option<serde_json::Value>) {
        self.rec.next_info().respond(InfoResponse { http_code, payload });
        self.pump();
    }
}
