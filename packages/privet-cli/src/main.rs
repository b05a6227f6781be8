//! Privet CLI - discover local devices and register them with the cloud
//!
//! This binary provides one-shot access to the discovery controller:
//! - List devices announced by the configured listers
//! - Query a device's `/privet/info`
//! - Register (claim) a device for a cloud account
//! - Manage the signed-in identity used for bearer-token confirmation

mod session;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use privet_core::auth::{self, IdentityCredentials};
use privet_core::config::{self, AgentConfig};
use privet_core::registration::{AccountChoice, IDENTITY_ACCOUNT_INDEX};
use privet_core::{Command, UiEvent};
use session::Session;
use std::path::PathBuf;
use tokio::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "privet")]
#[command(author = "Privet Team")]
#[command(version)]
#[command(about = "Discover local devices and register them with the cloud")]
#[command(long_about = "
Privet CLI talks to devices on the local network through their /privet HTTP
API and registers them with a cloud account.

Quick start:
  1. List devices:      privet devices
  2. Sign in:           privet login --account you@example.com --token <oauth-token>
  3. Register a device: privet register Printer1

Devices are read from the [[devices]] section of the config file, see
'privet config'.
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file (default: ~/.config/privet-agent/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List discovered devices
    Devices {
        /// How long to listen for announcements
        #[arg(short, long, default_value = "3")]
        wait_secs: u64,
    },

    /// Show a device's /privet/info
    Info {
        /// Device name
        name: String,

        /// How long to wait for the device and its answer
        #[arg(short, long, default_value = "15")]
        wait_secs: u64,
    },

    /// Register a device with the cloud
    Register {
        /// Device name
        name: String,

        /// Account index: -1 for the signed-in identity, 0.. for cookie accounts
        #[arg(short, long, default_value_t = IDENTITY_ACCOUNT_INDEX, allow_negative_numbers = true)]
        account: i64,

        /// Give up after this many seconds
        #[arg(short, long, default_value = "180")]
        wait_secs: u64,
    },

    /// Store the identity used for bearer-token confirmation
    Login {
        /// Account email
        #[arg(long)]
        account: String,

        /// OAuth access token
        #[arg(long)]
        token: String,

        /// Token lifetime in seconds
        #[arg(long)]
        expires_in: Option<i64>,
    },

    /// Forget the stored identity
    Logout,

    /// Show the signed-in identity
    Status,

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("privet={},privet_core={}", log_level, log_level).into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Devices { wait_secs } => cmd_devices(&cli, *wait_secs).await,
        Commands::Info { name, wait_secs } => cmd_info(&cli, name, *wait_secs).await,
        Commands::Register {
            name,
            account,
            wait_secs,
        } => cmd_register(&cli, name, *account, *wait_secs).await,
        Commands::Login {
            account,
            token,
            expires_in,
        } => cmd_login(&cli, account, token, *expires_in),
        Commands::Logout => cmd_logout(&cli),
        Commands::Status => cmd_status(&cli),
        Commands::Config => cmd_config(&cli),
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    match &cli.config {
        Some(path) => config::load_config_from(path),
        None => Ok(config::load_config()),
    }
}

async fn cmd_devices(cli: &Cli, wait_secs: u64) -> Result<()> {
    let config = load_config(cli)?;
    let mut session = Session::start(&config)?;
    let devices = session.collect_devices(Duration::from_secs(wait_secs)).await;
    session.shutdown().await?;

    match cli.format {
        OutputFormat::Text => {
            if devices.is_empty() {
                println!("No devices found.");
                println!("Add [[devices]] entries to {}", config::get_config_file_path_string());
                return Ok(());
            }
            println!("Found {} devices:", devices.len());
            println!();
            for device in &devices {
                if let UiEvent::DeviceUpdate {
                    name,
                    domain,
                    port,
                    ip,
                    registered,
                } = device
                {
                    let ip = if ip.is_empty() { "-" } else { ip.as_str() };
                    let state = if *registered { "registered" } else { "unregistered" };
                    println!("  {:20} {}:{:<6} {:15} {}", name, domain, port, ip, state);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "devices": devices }));
        }
    }
    Ok(())
}

async fn cmd_info(cli: &Cli, name: &str, wait_secs: u64) -> Result<()> {
    let config = load_config(cli)?;
    let mut session = Session::start(&config)?;
    let deadline = Instant::now() + Duration::from_secs(wait_secs);

    session
        .wait_for_device(name, Duration::from_secs(wait_secs))
        .await?;
    session.send(Command::RequestInfo {
        name: name.to_string(),
    })?;

    let mut outcome = None;
    while let Some(event) = session.next_event(deadline).await {
        if matches!(event, UiEvent::InfoResult { .. } | UiEvent::InfoFailed { .. }) {
            outcome = Some(event);
            break;
        }
    }
    session.shutdown().await?;

    match outcome {
        Some(UiEvent::InfoResult { payload }) => match cli.format {
            OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&payload)?),
            OutputFormat::Json => println!("{}", serde_json::json!({ "name": name, "info": payload })),
        },
        Some(UiEvent::InfoFailed { message }) => match cli.format {
            OutputFormat::Text => eprintln!("Info for '{}' failed: {}", name, message),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "name": name, "error": message }))
            }
        },
        _ => return Err(anyhow::anyhow!("No answer from '{}' within {}s", name, wait_secs)),
    }
    Ok(())
}

async fn cmd_register(cli: &Cli, name: &str, account: i64, wait_secs: u64) -> Result<()> {
    let choice = AccountChoice::from_index(account)
        .ok_or_else(|| anyhow::anyhow!("Invalid account index {}", account))?;
    let config = load_config(cli)?;
    let mut session = Session::start(&config)?;
    let deadline = Instant::now() + Duration::from_secs(wait_secs);

    session
        .wait_for_device(name, Duration::from_secs(wait_secs))
        .await?;
    session.send(Command::RegisterDevice {
        name: name.to_string(),
    })?;

    if let OutputFormat::Text = cli.format {
        println!("Registering '{}'. Confirm on the device if it asks.", name);
    }

    let mut outcome = None;
    while let Some(event) = session.next_event(deadline).await {
        match event {
            UiEvent::AccountsAvailable { accounts } => {
                let label = accounts
                    .iter()
                    .find(|a| a.index == choice.index())
                    .map(|a| a.label.clone())
                    .unwrap_or_default();
                tracing::debug!("Choosing account {} ('{}')", choice.index(), label);
                session.send(Command::ChooseUser { choice, label })?;
            }
            UiEvent::RegistrationSuccess { .. } | UiEvent::RegistrationFailed { .. } => {
                outcome = Some(event);
                break;
            }
            _ => {}
        }
    }
    session.shutdown().await?;

    match outcome {
        Some(UiEvent::RegistrationSuccess { device_id }) => match cli.format {
            OutputFormat::Text => println!("Registered '{}' as {}", name, device_id),
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "status": "registered", "name": name, "device_id": device_id })
            ),
        },
        Some(UiEvent::RegistrationFailed { message }) => match cli.format {
            OutputFormat::Text => eprintln!("Registration of '{}' failed: {}", name, message),
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "status": "failed", "name": name, "error": message })
            ),
        },
        _ => {
            return Err(anyhow::anyhow!(
                "Registration of '{}' did not finish within {}s",
                name,
                wait_secs
            ))
        }
    }
    Ok(())
}

fn cmd_login(cli: &Cli, account: &str, token: &str, expires_in: Option<i64>) -> Result<()> {
    let creds = IdentityCredentials {
        account: account.to_string(),
        access_token: token.to_string(),
        expires_at: expires_in.map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs)),
    };
    auth::save_credentials(&creds).context("Failed to store credentials")?;

    match cli.format {
        OutputFormat::Text => {
            println!("Signed in as {}", creds.account);
            if let Some(expires_at) = creds.expires_at {
                println!("Token expires at {}", expires_at.to_rfc3339());
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "signed_in",
                "account": creds.account,
                "expires_at": creds.expires_at,
            }));
        }
    }
    Ok(())
}

fn cmd_logout(cli: &Cli) -> Result<()> {
    let creds = auth::load_credentials()?;
    let Some(creds) = creds else {
        match cli.format {
            OutputFormat::Text => println!("Not signed in."),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "status": "not_signed_in" }));
            }
        }
        return Ok(());
    };

    auth::delete_credentials()?;

    match cli.format {
        OutputFormat::Text => println!("Signed out {}", creds.account),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "signed_out",
                "account": creds.account,
            }));
        }
    }
    Ok(())
}

fn cmd_status(cli: &Cli) -> Result<()> {
    let creds = auth::load_credentials()?;

    match cli.format {
        OutputFormat::Text => match &creds {
            Some(creds) => {
                println!("Status:  Signed in");
                println!("Account: {}", creds.account);
                println!(
                    "Expires: {}",
                    creds
                        .expires_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string())
                );
                println!();
                println!("Storage: {}", auth::get_credential_storage_info());
            }
            None => {
                println!("Status: Not signed in");
                println!();
                println!("Run 'privet login' to register devices with your identity,");
                println!("or pass --account N to use a cookie-session account.");
            }
        },
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "signed_in": creds.is_some(),
                "account": creds.as_ref().map(|c| c.account.clone()),
                "expires_at": creds.as_ref().and_then(|c| c.expires_at),
                "storage_info": auth::get_credential_storage_info(),
            }));
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let config_path = config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Cloud URL:        {} (from {})", config.cloud_url, config.cloud_url_source);
            println!("HTTP timeout:     {}s", config.http_timeout.as_secs());
            println!(
                "Claim polling:    every {}s, {} attempts",
                config.privet.claim_poll_interval.as_secs(),
                config.privet.claim_poll_attempts
            );
            println!("Static devices:   {}", config.devices.len());
            println!("Credential store: {}", auth::get_credential_storage_info());
            println!();
            println!("Environment variables:");
            println!("  PRIVET_CLOUD_URL - Override cloud URL");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "cloud_url": config.cloud_url,
                "cloud_url_source": format!("{}", config.cloud_url_source),
                "http_timeout_secs": config.http_timeout.as_secs(),
                "claim_poll_interval_secs": config.privet.claim_poll_interval.as_secs(),
                "claim_poll_attempts": config.privet.claim_poll_attempts,
                "devices": config.devices.iter().map(|d| &d.name).collect::<Vec<_>>(),
                "credential_storage": auth::get_credential_storage_info(),
            }));
        }
    }
    Ok(())
}
