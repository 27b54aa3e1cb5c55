//! CLI channel: stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, CommandInfo, IncomingMessage, Keyboard, MessageStream, OutgoingResponse,
};
use crate::error::ChannelError;

const CLI_USER_ID: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    handle: String,
}

impl CliChannel {
    pub fn new() -> Self {
        let handle = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
        Self { handle }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a reply the way a terminal can show it.
fn render(response: &OutgoingResponse) -> String {
    match &response.keyboard {
        Keyboard::Choices(options) if !options.is_empty() => {
            let buttons: Vec<String> = options.iter().map(|o| format!("[{o}]")).collect();
            format!("{}\n{}", response.content, buttons.join(" "))
        }
        _ => response.content.clone(),
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = self.handle.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg =
                            IncomingMessage::new("cli", CLI_USER_ID, &line).with_handle(&handle);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render(&response));
        eprint!("> ");
        Ok(())
    }

    async fn register_commands(&self, commands: &[CommandInfo]) -> Result<(), ChannelError> {
        let names: Vec<String> = commands.iter().map(|c| format!("/{}", c.name)).collect();
        eprintln!("   Commands: {}", names.join(" "));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
