//! Front-end bridge: JSON command lines in, JSON event lines out.

use anyhow::Context;
use privet_core::message::MessageSender;
use privet_core::{Command, EventReceiver, Message};
use std::io::BufRead;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Parse one command line; blank lines yield `None`
fn parse_line(line: &str) -> Option<Message> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match Command::from_json(line) {
        Ok(command) => Some(Message::Command(command)),
        Err(e) => {
            tracing::warn!("Rejected command: {}", e);
            None
        }
    }
}

/// Read stdin lines on a detached thread so a pending read never holds up shutdown
pub fn spawn_stdin_reader() -> anyhow::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to read commands: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

/// Forward commands until the input ends, the controller stops or `cancel` fires
pub async fn forward_commands(
    mut lines: mpsc::UnboundedReceiver<String>,
    tx: MessageSender,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Shutdown requested, no longer reading commands");
                return;
            }
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        let Some(message) = parse_line(&line) else {
            continue;
        };
        if tx.send(message).is_err() {
            tracing::debug!("Controller stopped, no longer reading commands");
            return;
        }
    }
    tracing::info!("Command input closed");
}

/// Write each event as one JSON line until every emitter is gone
pub async fn write_events<W>(mut events: EventReceiver, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = events.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}
