//! Inbound commands from the front-end.
//!
//! The front-end sends positional argument lists (`{"command": "chooseUser",
//! "args": [0, "bob@example.com"]}`). They are validated into a typed
//! [`Command`] here; anything that does not fit is rejected before it reaches
//! the controller.

use crate::error::{DiscoveryError, Result};
use crate::registration::AccountChoice;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the device lister and ask it for a refresh
    StartDiscovery,
    SetVisible(bool),
    RegisterDevice { name: String },
    RequestInfo { name: String },
    ChooseUser { choice: AccountChoice, label: String },
}

/// Raw command as it arrives on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CommandEnvelope {
    pub fn into_command(self) -> Result<Command> {
        Command::parse(&self.command, &self.args)
    }
}

impl Command {
    /// Parse a JSON line such as `{"command":"registerDevice","args":["Printer1"]}`
    pub fn from_json(line: &str) -> Result<Self> {
        let envelope: CommandEnvelope = serde_json::from_str(line)
            .map_err(|e| malformed(format!("invalid command JSON: {}", e)))?;
        envelope.into_command()
    }

    pub fn parse(name: &str, args: &[Value]) -> Result<Self> {
        match name {
            "start" | "startDiscovery" => Ok(Command::StartDiscovery),
            "isVisible" | "setVisible" => {
                let visible = arg(name, args, 0)?
                    .as_bool()
                    .ok_or_else(|| malformed(format!("{}: argument 0 must be a boolean", name)))?;
                Ok(Command::SetVisible(visible))
            }
            "registerDevice" => Ok(Command::RegisterDevice {
                name: device_name(name, args)?,
            }),
            "info" | "requestInfo" => Ok(Command::RequestInfo {
                name: device_name(name, args)?,
            }),
            "chooseUser" => {
                let index = arg(name, args, 0)?
                    .as_i64()
                    .ok_or_else(|| malformed(format!("{}: argument 0 must be an integer", name)))?;
                let choice = AccountChoice::from_index(index)
                    .ok_or_else(|| malformed(format!("{}: invalid account index {}", name, index)))?;
                let label = arg(name, args, 1)?
                    .as_str()
                    .ok_or_else(|| malformed(format!("{}: argument 1 must be a string", name)))?
                    .to_string();
                Ok(Command::ChooseUser { choice, label })
            }
            other => Err(malformed(format!("unknown command '{}'", other))),
        }
    }
}

fn arg<'a>(command: &str, args: &'a [Value], index: usize) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| malformed(format!("{}: missing argument {}", command, index)))
}

fn device_name(command: &str, args: &[Value]) -> Result<String> {
    let name = arg(command, args, 0)?
        .as_str()
        .ok_or_else(|| malformed(format!("{}: argument 0 must be a string", command)))?;
    if name.is_empty() {
        return Err(malformed(format!("{}: device name is empty", command)));
    }
    Ok(name.to_string())
}

fn malformed(reason: String) -> DiscoveryError {
    DiscoveryError::MalformedCommand(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_commands() {
        assert_eq!(Command::parse("start", &[]).unwrap(), Command::StartDiscovery);
        assert_eq!(
            Command::parse("isVisible", &[json!(true)]).unwrap(),
            Command::SetVisible(true)
        );
        assert_eq!(
            Command::parse("registerDevice", &[json!("Printer1")]).unwrap(),
            Command::RegisterDevice {
                name: "Printer1".to_string()
            }
        );
        assert_eq!(
            Command::parse("info", &[json!("Printer1")]).unwrap(),
            Command::RequestInfo {
                name: "Printer1".to_string()
            }
        );
        assert_eq!(
            Command::parse("chooseUser", &[json!(-1), json!("")]).unwrap(),
            Command::ChooseUser {
                choice: AccountChoice::Identity,
                label: String::new()
            }
        );
        assert_eq!(
            Command::parse("chooseUser", &[json!(2), json!("bob@example.com")]).unwrap(),
            Command::ChooseUser {
                choice: AccountChoice::Cookie(2),
                label: "bob@example.com".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_commands_are_rejected() {
        let cases: Vec<(&str, Vec<Value>)> = vec![
            ("registerDevice", vec![]),
            ("registerDevice", vec![json!(42)]),
            ("registerDevice", vec![json!("")]),
            ("isVisible", vec![json!("yes")]),
            ("chooseUser", vec![json!("0"), json!("bob")]),
            ("chooseUser", vec![json!(0)]),
            ("chooseUser", vec![json!(-2), json!("bob")]),
            ("chooseUser", vec![json!(1.5), json!("bob")]),
            ("reboot", vec![]),
        ];

        for (name, args) in cases {
            let result = Command::parse(name, &args);
            assert!(
                matches!(result, Err(DiscoveryError::MalformedCommand(_))),
                "{} {:?} should be rejected, got {:?}",
                name,
                args,
                result
            );
        }
    }

    #[test]
    fn test_from_json_line() {
        let cmd = Command::from_json(r#"{"command":"requestInfo","args":["Printer1"]}"#).unwrap();
        assert_eq!(
            cmd,
            Command::RequestInfo {
                name: "Printer1".to_string()
            }
        );

        let cmd = Command::from_json(r#"{"command":"startDiscovery"}"#).unwrap();
        assert_eq!(cmd, Command::StartDiscovery);

        assert!(matches!(
            Command::from_json("not json"),
            Err(DiscoveryError::MalformedCommand(_))
        ));
    }
}
