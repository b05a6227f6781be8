use super::credentials::{load_credentials, IdentityCredentials};
use crate::ports::{IdentityProvider, TokenProvider};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Hands out a token that was stored at sign-in
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> BoxFuture<'static, anyhow::Result<String>> {
        futures::future::ready(Ok(self.token.clone())).boxed()
    }
}

/// Identity backed by the credential store
#[derive(Debug, Clone, Default)]
pub struct StoredIdentity {
    credentials: Option<IdentityCredentials>,
}

impl StoredIdentity {
    pub fn new(credentials: Option<IdentityCredentials>) -> Self {
        Self { credentials }
    }

    /// Read the stored identity; storage errors mean "not signed in"
    pub fn load() -> Self {
        match load_credentials() {
            Ok(credentials) => Self::new(credentials),
            Err(e) => {
                tracing::warn!("Failed to load identity credentials: {:#}", e);
                Self::default()
            }
        }
    }
}

impl IdentityProvider for StoredIdentity {
    fn signed_in_account(&self) -> Option<String> {
        self.credentials.as_ref().map(|c| c.account.clone())
    }

    fn token_provider(&self) -> Option<Arc<dyn TokenProvider>> {
        let creds = self.credentials.as_ref()?;
        if creds.is_expired() || creds.access_token.is_empty() {
            tracing::debug!("No usable access token for {}", creds.account);
            return None;
        }
        Some(Arc::new(StaticTokenProvider::new(creds.access_token.clone())))
    }
}
