//! Identity credential storage with platform keyring and file-based fallback.
//!
//! Storage priority:
//! 1. Platform keyring (if `keyring-storage` feature enabled and available)
//! 2. File-based storage in the config directory (owner read/write only)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "keyring-storage")]
use keyring::Entry;

/// Service name used for keyring storage
#[cfg(feature = "keyring-storage")]
const KEYRING_SERVICE: &str = "privet-agent";
/// Username used for keyring entry
#[cfg(feature = "keyring-storage")]
const KEYRING_USER: &str = "identity";

const CREDENTIALS_FILE: &str = ".identity";

/// The signed-in cloud identity and its OAuth access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCredentials {
    pub account: String,
    pub access_token: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl IdentityCredentials {
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| chrono::Utc::now() > expires_at)
    }
}

/// Get the credentials file path for file-based storage
fn get_credentials_file_path() -> Result<PathBuf> {
    let config_dir = crate::config::get_config_dir().context("Failed to find config directory")?;
    Ok(config_dir.join(CREDENTIALS_FILE))
}

// ============================================================================
// File-based credential storage (always available)
// ============================================================================

fn save_credentials_to_file(path: &Path, creds: &IdentityCredentials) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).context("Failed to create config directory")?;
    }
    let json = serde_json::to_string(creds).context("Failed to serialize credentials")?;

    // Set restrictive permissions on Unix before writing
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600) // Owner read/write only
            .open(path)
            .context("Failed to create credentials file")?;
        let mut file = std::io::BufWriter::new(file);
        file.write_all(json.as_bytes())
            .context("Failed to write credentials")?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, &json).context("Failed to write credentials file")?;
    }

    tracing::debug!("Credentials saved to file: {:?}", path);
    Ok(())
}

fn load_credentials_from_file(path: &Path) -> Result<Option<IdentityCredentials>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).context("Failed to read credentials file")?;
    let creds: IdentityCredentials =
        serde_json::from_str(&content).context("Failed to parse credentials file")?;
    tracing::debug!("Credentials loaded from file");
    Ok(Some(creds))
}

fn delete_credentials_from_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to delete credentials file: {}", e);
        }
    }
}

// ============================================================================
// Keyring-based credential storage (optional, platform-specific)
// ============================================================================

#[cfg(feature = "keyring-storage")]
fn get_keyring_entry() -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, KEYRING_USER).map_err(|e| {
        tracing::error!(
            "Failed to create keyring entry (service='{}', user='{}'): {}",
            KEYRING_SERVICE,
            KEYRING_USER,
            e
        );
        anyhow::anyhow!("Failed to create keyring entry: {}", e)
    })
}

#[cfg(feature = "keyring-storage")]
fn save_credentials_to_keyring(path: &Path, creds: &IdentityCredentials) -> Result<()> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("{}, using file storage", e);
            return save_credentials_to_file(path, creds);
        }
    };

    let json = serde_json::to_string(creds).context("Failed to serialize credentials")?;
    if let Err(e) = entry.set_password(&json) {
        tracing::warn!("Failed to save credentials to keyring: {}, using file storage", e);
        return save_credentials_to_file(path, creds);
    }

    // Keep a file copy so headless sessions without a keyring still work
    if let Err(e) = save_credentials_to_file(path, creds) {
        tracing::debug!("Failed to save backup credentials to file: {}", e);
    }
    Ok(())
}

#[cfg(feature = "keyring-storage")]
fn load_credentials_from_keyring(path: &Path) -> Result<Option<IdentityCredentials>> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("{}, trying file fallback", e);
            return load_credentials_from_file(path);
        }
    };

    match entry.get_password() {
        Ok(json) => {
            tracing::debug!("Credentials loaded from keyring");
            let creds = serde_json::from_str(&json).context("Failed to parse credentials from keyring")?;
            Ok(Some(creds))
        }
        Err(keyring::Error::NoEntry) => {
            tracing::debug!("No credentials in keyring, trying file fallback");
            load_credentials_from_file(path)
        }
        Err(e) => {
            tracing::warn!("Failed to load credentials from keyring: {}, trying file fallback", e);
            load_credentials_from_file(path)
        }
    }
}

#[cfg(feature = "keyring-storage")]
fn delete_credentials_from_keyring(path: &Path) -> Result<()> {
    // Always delete from file as well
    delete_credentials_from_file(path);

    let entry = get_keyring_entry()?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(anyhow::anyhow!("Failed to delete credentials from keyring: {}", e)),
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Load the stored identity, discarding it if its token has expired
pub fn load_credentials() -> Result<Option<IdentityCredentials>> {
    let path = get_credentials_file_path()?;

    #[cfg(feature = "keyring-storage")]
    let creds = load_credentials_from_keyring(&path)?;

    #[cfg(not(feature = "keyring-storage"))]
    let creds = load_credentials_from_file(&path)?;

    Ok(discard_expired(creds, delete_credentials))
}

/// Drop expired credentials; a failed delete is logged and still yields `None`
fn discard_expired(
    creds: Option<IdentityCredentials>,
    delete: impl FnOnce() -> Result<()>,
) -> Option<IdentityCredentials> {
    match creds {
        Some(c) if c.is_expired() => {
            tracing::info!("Credentials for {} expired, deleting", c.account);
            if let Err(e) = delete() {
                tracing::warn!("Failed to delete expired credentials: {:#}", e);
            }
            None
        }
        other => other,
    }
}

pub fn save_credentials(creds: &IdentityCredentials) -> Result<()> {
    let path = get_credentials_file_path()?;

    #[cfg(feature = "keyring-storage")]
    save_credentials_to_keyring(&path, creds)?;

    #[cfg(not(feature = "keyring-storage"))]
    save_credentials_to_file(&path, creds)?;

    tracing::info!("Credentials saved securely for account: {}", creds.account);
    Ok(())
}

/// Delete credentials from all storage locations
pub fn delete_credentials() -> Result<()> {
    let path = get_credentials_file_path()?;

    #[cfg(feature = "keyring-storage")]
    delete_credentials_from_keyring(&path)?;

    #[cfg(not(feature = "keyring-storage"))]
    delete_credentials_from_file(&path);

    Ok(())
}

/// Get information about credential storage location (for documentation/debugging)
pub fn get_credential_storage_info() -> String {
    #[cfg(all(feature = "keyring-storage", target_os = "windows"))]
    {
        "Windows Credential Manager (with file fallback)".to_string()
    }
    #[cfg(all(feature = "keyring-storage", target_os = "macos"))]
    {
        "macOS Keychain (with file fallback)".to_string()
    }
    #[cfg(all(
        feature = "keyring-storage",
        not(any(target_os = "windows", target_os = "macos"))
    ))]
    {
        "Linux Secret Service (GNOME Keyring/KWallet, with file fallback)".to_string()
    }
    #[cfg(not(feature = "keyring-storage"))]
    {
        let path = get_credentials_file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| format!("~/.config/privet-agent/{}", CREDENTIALS_FILE));
        format!("File-based storage: {}", path)
    }
}
