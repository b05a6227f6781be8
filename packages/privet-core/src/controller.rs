//! The controller owns the registry and all flows and consumes the single
//! message channel they report into. Messages are handled strictly in
//! arrival order on one task.

use crate::command::Command;
use crate::device::{DeviceLister, DeviceRegistry, DiscoveryEvent, DiscoverySink};
use crate::event::{EventEmitter, UiEvent};
use crate::info::InfoQueries;
use crate::message::{Message, MessageReceiver, MessageSender};
use crate::ports::Collaborators;
use crate::registration::RegistrationOrchestrator;
use crate::visibility::{ViewerVisibility, VisibilityCounter};

pub struct LocalDiscoveryController {
    registry: DeviceRegistry,
    registration: RegistrationOrchestrator,
    info: InfoQueries,
    visibility: ViewerVisibility,
    lister: Box<dyn DeviceLister>,
    lister_started: bool,
    events: EventEmitter,
    tx: MessageSender,
}

impl LocalDiscoveryController {
    /// Controller counted against the process-wide visibility counter
    pub fn new(collaborators: Collaborators, tx: MessageSender, events: EventEmitter) -> Self {
        Self::with_visibility_counter(collaborators, tx, events, VisibilityCounter::global())
    }

    pub fn with_visibility_counter(
        collaborators: Collaborators,
        tx: MessageSender,
        events: EventEmitter,
        counter: &'static VisibilityCounter,
    ) -> Self {
        let Collaborators {
            lister,
            http,
            accounts,
            confirm,
            identity,
        } = collaborators;

        Self {
            registry: DeviceRegistry::new(),
            registration: RegistrationOrchestrator::new(
                http.clone(),
                accounts,
                confirm,
                identity,
                tx.clone(),
                events.clone(),
            ),
            info: InfoQueries::new(http, tx.clone(), events.clone()),
            visibility: ViewerVisibility::new(counter),
            lister,
            lister_started: false,
            events,
            tx,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registration(&self) -> &RegistrationOrchestrator {
        &self.registration
    }

    pub fn info(&self) -> &InfoQueries {
        &self.info
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Process messages until `Message::Shutdown` arrives
    pub async fn run(mut self, mut rx: MessageReceiver) {
        tracing::info!("Local discovery controller running");
        while let Some(message) = rx.recv().await {
            if matches!(message, Message::Shutdown) {
                break;
            }
            self.handle(message);
        }
        tracing::info!("Local discovery controller stopped");
    }

    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Command(command) => self.handle_command(command),
            Message::Discovery(event) => self.handle_discovery(event),
            Message::Poll { force } => {
                if self.lister_started {
                    self.lister.discover_new_devices(force);
                }
            }
            Message::Registration { session, step } => {
                self.registration.handle_step(session, step, &self.registry)
            }
            Message::Info { query, step } => self.info.handle_step(query, step),
            Message::Shutdown => {}
        }
    }

    fn handle_command(&mut self, command: Command) {
        tracing::debug!("Command: {:?}", command);
        match command {
            Command::StartDiscovery => {
                if !self.lister_started {
                    self.lister.start(DiscoverySink::new(self.tx.clone()));
                    self.lister_started = true;
                }
                self.lister.discover_new_devices(false);
            }
            Command::SetVisible(visible) => self.visibility.set_visible(visible),
            Command::RegisterDevice { name } => {
                self.registration.register_device(&name, &self.registry)
            }
            Command::RequestInfo { name } => self.info.request_info(&name, &self.registry),
            Command::ChooseUser { choice, label } => {
                self.registration.choose_user(choice, &label, &self.registry)
            }
        }
    }

    fn handle_discovery(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Changed(description) => {
                tracing::debug!("Device changed: {} at {}", description.name, description.address);
                self.events.emit(UiEvent::device_update(&description));
                self.registry.upsert(description);
            }
            DiscoveryEvent::Removed(name) => {
                tracing::debug!("Device removed: {}", name);
                self.registry.remove(&name);
                self.events.emit(UiEvent::DeviceRemoved { name });
            }
        }
    }
}
