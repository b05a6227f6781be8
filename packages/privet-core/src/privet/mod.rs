//! Network-backed collaborators.
//!
//! Talks to devices over their local `/privet` HTTP API and to the cloud
//! service for account listing and claim confirmation. All requests share one
//! `reqwest` client with a cookie store so cookie-session accounts work.

mod client;
mod cloud;
mod task;

pub use client::{PrivetClientFactory, PrivetHttpClient};
pub use cloud::{CloudAccountResolver, CloudConfirmFlows};

use crate::auth::StoredIdentity;
use crate::config::AgentConfig;
use crate::device::StaticDeviceLister;
use crate::ports::Collaborators;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Build the shared HTTP client
pub fn build_http_client(config: &AgentConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout)
        .cookie_store(true)
        .user_agent(concat!("privet-agent/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Collaborators for a running agent: configured devices, real HTTP and the
/// stored identity
pub fn default_collaborators(config: &AgentConfig) -> Result<Collaborators> {
    let http = build_http_client(config)?;
    Ok(Collaborators {
        lister: Box::new(StaticDeviceLister::from_config(&config.devices, &config.cloud_url)),
        http: Arc::new(PrivetClientFactory::new(http.clone(), config.privet.clone())),
        accounts: Arc::new(CloudAccountResolver::new(http.clone())),
        confirm: Arc::new(CloudConfirmFlows::new(http)),
        identity: Arc::new(StoredIdentity::load()),
    })
}
