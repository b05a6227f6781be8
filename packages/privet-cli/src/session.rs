//! In-process controller for one-shot CLI commands
//!
//! The CLI runs the same controller as the agent, feeds it commands and
//! watches its events until the command has its answer.

use anyhow::{Context, Result};
use privet_core::message::{self, MessageSender};
use privet_core::{
    privet, AgentConfig, Command, EventEmitter, EventReceiver, LocalDiscoveryController, Message,
    UiEvent,
};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};

pub struct Session {
    tx: MessageSender,
    events: EventReceiver,
    task: JoinHandle<()>,
}

impl Session {
    /// Start a controller and begin discovery
    pub fn start(config: &AgentConfig) -> Result<Self> {
        let collaborators = privet::default_collaborators(config)?;
        let (tx, rx) = message::channel();
        let (emitter, events) = EventEmitter::channel();
        let controller = LocalDiscoveryController::new(collaborators, tx.clone(), emitter);
        let task = tokio::spawn(controller.run(rx));

        let session = Self { tx, events, task };
        session.send(Command::StartDiscovery)?;
        Ok(session)
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Message::Command(command))
            .map_err(|_| anyhow::anyhow!("Controller stopped"))
    }

    /// Next event, or `None` once `deadline` has passed
    pub async fn next_event(&mut self, deadline: Instant) -> Option<UiEvent> {
        match timeout_at(deadline, self.events.recv()).await {
            Ok(event) => event,
            Err(_) => None,
        }
    }

    /// Every device announced before `wait` elapses
    pub async fn collect_devices(&mut self, wait: Duration) -> Vec<UiEvent> {
        let deadline = Instant::now() + wait;
        let mut devices: Vec<UiEvent> = Vec::new();
        while let Some(event) = self.next_event(deadline).await {
            match &event {
                UiEvent::DeviceUpdate { name, .. } => {
                    devices.retain(|d| !matches!(d, UiEvent::DeviceUpdate { name: n, .. } if n == name));
                    devices.push(event);
                }
                UiEvent::DeviceRemoved { name } => {
                    devices.retain(|d| !matches!(d, UiEvent::DeviceUpdate { name: n, .. } if n == name));
                }
                _ => {}
            }
        }
        devices
    }

    /// Wait until `name` has been discovered
    pub async fn wait_for_device(&mut self, name: &str, wait: Duration) -> Result<()> {
        let deadline = Instant::now() + wait;
        while let Some(event) = self.next_event(deadline).await {
            if matches!(&event, UiEvent::DeviceUpdate { name: n, .. } if n == name) {
                return Ok(());
            }
        }
        Err(anyhow::anyhow!("Device '{}' was not discovered within {}s", name, wait.as_secs()))
    }

    pub async fn shutdown(self) -> Result<()> {
        if self.tx.send(Message::Shutdown).is_err() {
            tracing::debug!("Controller already stopped");
        }
        self.task.await.context("Controller task failed")
    }
}
