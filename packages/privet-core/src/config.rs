use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cloud service devices register with
const DEFAULT_CLOUD_URL: &str = "https://www.google.com/cloudprint";

/// Environment variable name for cloud URL override
const ENV_CLOUD_URL: &str = "PRIVET_CLOUD_URL";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CLAIM_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_CLAIM_POLL_ATTEMPTS: u32 = 60;
const DEFAULT_DISCOVERY_POLL_SECS: u64 = 30;

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    cloud: Option<CloudSection>,
    http: Option<HttpSection>,
    privet: Option<PrivetSection>,
    discovery: Option<DiscoverySection>,
    #[serde(default)]
    devices: Vec<StaticDevice>,
}

#[derive(Debug, Deserialize, Default)]
struct CloudSection {
    /// Cloud base URL for devices that do not advertise one
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct HttpSection {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PrivetSection {
    claim_poll_interval_secs: Option<u64>,
    claim_poll_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DiscoverySection {
    poll_interval_secs: Option<u64>,
}

/// A device listed in the config file instead of being discovered
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StaticDevice {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub ip: Option<String>,
    /// Cloud base URL; the `[cloud] url` value when absent
    pub url: Option<String>,
    /// Cloud id if the device is already claimed
    pub id: Option<String>,
}

/// Where the cloud URL came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Tuning for the device-local register protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivetSettings {
    /// Delay between `getClaimToken` calls while the device waits for the user
    pub claim_poll_interval: Duration,
    /// How many `getClaimToken` calls to make before giving up
    pub claim_poll_attempts: u32,
}

impl Default for PrivetSettings {
    fn default() -> Self {
        Self {
            claim_poll_interval: Duration::from_secs(DEFAULT_CLAIM_POLL_INTERVAL_SECS),
            claim_poll_attempts: DEFAULT_CLAIM_POLL_ATTEMPTS,
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub cloud_url: String,
    pub cloud_url_source: ConfigSource,
    pub http_timeout: Duration,
    pub privet: PrivetSettings,
    /// How often visible viewers refresh discovery
    pub discovery_poll_interval: Duration,
    pub devices: Vec<StaticDevice>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cloud_url: DEFAULT_CLOUD_URL.to_string(),
            cloud_url_source: ConfigSource::Default,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            privet: PrivetSettings::default(),
            discovery_poll_interval: Duration::from_secs(DEFAULT_DISCOVERY_POLL_SECS),
            devices: Vec::new(),
        }
    }
}

/// Get the config directory shared by config and credentials
pub(crate) fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("privet-agent"))
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    get_config_dir().map(|p| p.join("config.toml"))
}

fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    (!url.is_empty()).then(|| url.to_string())
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    toml::from_str(content).context("Failed to parse config file")
}

/// Load configuration from the config file
fn load_config_file(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {:#}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Combine the file contents with the environment override.
///
/// Cloud URL priority:
/// 1. Environment variable (PRIVET_CLOUD_URL)
/// 2. Config file (`[cloud] url`)
/// 3. Default value
fn resolve_config(file: Option<ConfigFile>, env_cloud_url: Option<String>) -> AgentConfig {
    let file = file.unwrap_or_default();
    let mut config = AgentConfig::default();

    if let Some(url) = file.cloud.and_then(|c| c.url).as_deref().and_then(normalize_url) {
        tracing::info!("Using cloud URL from config file: {}", url);
        config.cloud_url = url;
        config.cloud_url_source = ConfigSource::ConfigFile;
    }

    if let Some(url) = env_cloud_url.as_deref().and_then(normalize_url) {
        tracing::info!("Using cloud URL from environment variable: {}", url);
        config.cloud_url = url;
        config.cloud_url_source = ConfigSource::Environment;
    }

    if let Some(secs) = file.http.and_then(|h| h.timeout_secs) {
        config.http_timeout = Duration::from_secs(secs);
    }
    if let Some(privet) = file.privet {
        if let Some(secs) = privet.claim_poll_interval_secs {
            config.privet.claim_poll_interval = Duration::from_secs(secs);
        }
        if let Some(attempts) = privet.claim_poll_attempts {
            config.privet.claim_poll_attempts = attempts.max(1);
        }
    }
    if let Some(secs) = file.discovery.and_then(|d| d.poll_interval_secs) {
        config.discovery_poll_interval = Duration::from_secs(secs.max(1));
    }
    config.devices = file.devices;

    config
}

/// Load the agent configuration from `~/.config/privet-agent/config.toml`
/// and the environment
pub fn load_config() -> AgentConfig {
    let file = get_config_file_path().and_then(|p| load_config_file(&p));
    resolve_config(file, std::env::var(ENV_CLOUD_URL).ok())
}

/// Load the agent configuration from an explicit file
pub fn load_config_from(path: &Path) -> Result<AgentConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let file = parse_config(&content)?;
    Ok(resolve_config(Some(file), std::env::var(ENV_CLOUD_URL).ok()))
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/privet-agent/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# Privet Agent Configuration
# Place this file at: ~/.config/privet-agent/config.toml

[cloud]
# Cloud service for devices that do not advertise one
# Default: https://www.google.com/cloudprint
# url = "https://cloud.example.com/cloudprint"

[http]
# Timeout for device and cloud requests
# timeout_secs = 10

[privet]
# How often to ask the device for a claim token while it waits for the user
# claim_poll_interval_secs = 2
# claim_poll_attempts = 60

[discovery]
# Refresh interval while a viewer is visible
# poll_interval_secs = 30

# Devices to announce without network discovery
# [[devices]]
# name = "Printer1"
# host = "printer1.local"
# port = 8080
# ip = "192.168.1.20"
"#
    .to_string()
}
