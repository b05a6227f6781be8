//! Signed-in identity for the bearer-token confirm path.
//!
//! Provides secure storage of the identity's access token and an
//! [`IdentityProvider`](crate::ports::IdentityProvider) backed by it.

mod credentials;
mod identity;

pub use credentials::{
    delete_credentials, get_credential_storage_info, load_credentials, save_credentials,
    IdentityCredentials,
};
pub use identity::{StaticTokenProvider, StoredIdentity};
