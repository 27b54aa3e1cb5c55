//! Telegram channel: long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation: `getUpdates` long-polling in,
//! `sendMessage` with optional reply keyboards out.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{
    Channel, CommandInfo, IncomingMessage, Keyboard, MessageStream, OutgoingResponse,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed or rejected poll.
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// Send a text message, splitting anything over Telegram's 4096 char limit.
    /// The keyboard rides on the last chunk.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { keyboard } else { &Keyboard::None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = reply_markup(keyboard) {
            body["reply_markup"] = markup;
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendMessage returned {status}: {err}"),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        // reqwest errors embed the URL; strip it so the token never hits the log.
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let messages = match handle_poll_response(&data, &mut offset) {
                    Ok(messages) => messages,
                    Err(reason) => {
                        tracing::warn!("Telegram getUpdates rejected: {}", reason);
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                for incoming in messages {
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_message(chat_id, &response.content, &response.keyboard)
            .await
    }

    async fn register_commands(&self, commands: &[CommandInfo]) -> Result<(), ChannelError> {
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|c| serde_json::json!({"command": c.name, "description": c.description}))
            .collect();

        let resp = self
            .client
            .post(self.api_url("setMyCommands"))
            .json(&serde_json::json!({ "commands": commands }))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            return Err(ChannelError::Http(format!(
                "setMyCommands returned {}",
                resp.status()
            )));
        }
        tracing::info!(count = commands.len(), "Telegram commands registered");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

/// Messages from one `getUpdates` reply, advancing `offset` past every update.
///
/// An `ok: false` reply (bad token, a competing poller) yields the API's
/// error code and description.
fn handle_poll_response(
    data: &serde_json::Value,
    offset: &mut i64,
) -> Result<Vec<IncomingMessage>, String> {
    let Some(results) = data.get("result").and_then(serde_json::Value::as_array) else {
        let code = data
            .get("error_code")
            .and_then(serde_json::Value::as_i64)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        let description = data
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("no result in response");
        return Err(format!("{code}: {description}"));
    };

    let mut messages = Vec::new();
    for update in results {
        if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64) {
            *offset = uid + 1;
        }
        messages.extend(parse_update(update));
    }
    Ok(messages)
}

/// Turn a `getUpdates` entry into an inbound message.
///
/// Non-text messages (stickers, photos) arrive with empty content. Returns
/// `None` for other update kinds and messages without a sender.
fn parse_update(update: &serde_json::Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message
        .get("text")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    let from = message.get("from")?;
    let user_id = from.get("id").and_then(serde_json::Value::as_i64)?;
    let username = from.get("username").and_then(|u| u.as_str());

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let mut incoming = IncomingMessage::new("telegram", &user_id.to_string(), text)
        .with_metadata(serde_json::json!({ "chat_id": chat_id }));
    if let Some(username) = username {
        incoming = incoming.with_handle(username);
    }
    Some(incoming)
}

/// Bot API `reply_markup` for a keyboard, if one should be sent.
fn reply_markup(keyboard: &Keyboard) -> Option<serde_json::Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Choices(options) if options.is_empty() => None,
        Keyboard::Choices(options) => {
            let rows: Vec<serde_json::Value> = options
                .iter()
                .map(|o| serde_json::json!([{ "text": o }]))
                .collect();
            Some(serde_json::json!({
                "keyboard": rows,
                "one_time_keyboard": true,
                "resize_keyboard": true,
            }))
        }
        Keyboard::Remove => Some(serde_json::json!({ "remove_keyboard": true })),
    }
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
