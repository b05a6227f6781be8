//! Privet Core Library
//!
//! This crate provides the core functionality for local device discovery and
//! cloud registration:
//! - Device registry fed by a discovery lister
//! - Registration orchestration (claim token, account choice, cloud confirm)
//! - One-shot device info queries
//! - Identity credential management (keyring with file fallback)
//!
//! Everything runs on one [`LocalDiscoveryController`] task that consumes a
//! single message channel. Collaborators answer by posting into that channel.
//!
//! # Features
//!
//! - `keyring-storage` (default): Use platform keyring for credential storage
//! - `file-storage`: Use file-based credential storage (for headless Linux)
//!
//! # Example
//!
//! ```no_run
//! use privet_core::{config, message, privet, Command, EventEmitter, LocalDiscoveryController, Message};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config();
//!     let (tx, rx) = message::channel();
//!     let (events, mut event_rx) = EventEmitter::channel();
//!
//!     let controller =
//!         LocalDiscoveryController::new(privet::default_collaborators(&config)?, tx.clone(), events);
//!     tokio::spawn(controller.run(rx));
//!
//!     tx.send(Message::Command(Command::StartDiscovery))
//!         .map_err(|_| anyhow::anyhow!("controller stopped"))?;
//!     while let Some(event) = event_rx.recv().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod command;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod event;
pub mod info;
pub mod message;
pub mod ports;
pub mod privet;
pub mod registration;
pub mod visibility;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use command::Command;
pub use config::{AgentConfig, ConfigSource};
pub use controller::LocalDiscoveryController;
pub use device::{DeviceDescription, DeviceRegistry, HostPort};
pub use error::{DiscoveryError, FailureReason, ProtocolFailure};
pub use event::{EventEmitter, EventReceiver, UiEvent};
pub use message::Message;
pub use ports::Collaborators;
pub use visibility::VisibilityCounter;
