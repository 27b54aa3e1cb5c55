//! Main bot loop: command dispatch and flow routing.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::bot::command::{COMMANDS, Command, help_text};
use crate::channels::{ChannelManager, IncomingMessage, Keyboard, OutgoingResponse};
use crate::config::BotConfig;
use crate::error::Error;
use crate::flows::{RegistrationFlow, SearchFlow};
use crate::store::ProfileStore;
use crate::wizard::{Participant, StepEngine, StepResult};

/// Reply sent when a store call fails; the detail only goes to the log.
pub const TRANSIENT_FAILURE: &str =
    "Something went wrong on our side. Please try again in a moment.";

/// Shared components for the bot.
pub struct BotDeps {
    pub store: Arc<dyn ProfileStore>,
}

/// Routes every inbound message to a command or to the active flow.
pub struct Bot {
    config: BotConfig,
    deps: BotDeps,
    channels: Arc<ChannelManager>,
    registration: Arc<StepEngine<RegistrationFlow>>,
    search: Arc<StepEngine<SearchFlow>>,
}

impl Bot {
    pub fn new(config: BotConfig, deps: BotDeps, channels: ChannelManager) -> Self {
        let registration = StepEngine::new(
            RegistrationFlow::new(Arc::clone(&deps.store)),
            Arc::clone(&deps.store),
            config.skip_token.clone(),
            config.top_cities_limit,
        );
        let search = StepEngine::new(
            SearchFlow::new(Arc::clone(&deps.store)),
            Arc::clone(&deps.store),
            config.skip_token.clone(),
            config.top_cities_limit,
        );
        Self {
            config,
            deps,
            channels: Arc::new(channels),
            registration: Arc::new(registration),
            search: Arc::new(search),
        }
    }

    fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.deps.store
    }

    // ── Main loop ───────────────────────────────────────────────────

    /// Run until Ctrl+C or until every channel stream ends.
    pub async fn run(self) -> Result<(), Error> {
        self.channels.check_health().await;
        let mut message_stream = self.channels.start_all().await?;
        self.channels.register_commands(COMMANDS).await;

        let registration = Arc::clone(&self.registration);
        let search = Arc::clone(&self.search);
        let idle_timeout = self.config.draft_idle_timeout;
        let prune_interval = self.config.draft_prune_interval;
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(prune_interval);
            interval.tick().await; // Skip immediate first tick

            loop {
                interval.tick().await;
                registration.prune_stale(idle_timeout).await;
                search.prune_stale(idle_timeout).await;
            }
        });

        info!(bot = %self.config.name, channels = ?self.channels.names(), "Bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            let response = self.reply(&message).await;
            if let Err(e) = self.channels.respond(&message, response).await {
                error!(user_id = %message.user_id, channel = %message.channel, error = %e, "Failed to send reply");
            }
        }

        info!("Bot shutting down...");
        pruning_handle.abort();
        self.channels.shutdown_all().await;
        Ok(())
    }

    /// The reply for one inbound message. Failures become a generic notice.
    pub async fn reply(&self, message: &IncomingMessage) -> OutgoingResponse {
        match self.handle_message(message).await {
            Ok(response) => response,
            Err(e) => {
                error!(user_id = %message.user_id, error = %e, "Error handling message");
                OutgoingResponse::text(TRANSIENT_FAILURE).with_keyboard(Keyboard::Remove)
            }
        }
    }

    // ── Message dispatch ────────────────────────────────────────────

    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<OutgoingResponse, Error> {
        debug!(
            user_id = %message.user_id,
            channel = %message.channel,
            chars = message.content.len(),
            "Received message"
        );

        if let Some(command) = Command::parse(&message.content) {
            return self.handle_command(message, command).await;
        }

        let participant = Participant::new(message.user_id.clone(), message.handle.clone());
        let text = (!message.content.is_empty()).then_some(message.content.as_str());

        let step = match self.registration.advance(&participant, text).await? {
            Some(step) => Some(step),
            None => self.search.advance(&participant, text).await?,
        };

        Ok(match step {
            Some(
                StepResult::Next(r)
                | StepResult::Retry(r)
                | StepResult::Completed(r)
                | StepResult::Aborted(r),
            ) => r,
            None => OutgoingResponse::text("Send /start to register or /help to see what I can do."),
        })
    }

    async fn handle_command(
        &self,
        message: &IncomingMessage,
        command: Command,
    ) -> Result<OutgoingResponse, Error> {
        let user_id = message.user_id.as_str();
        info!(user_id = %user_id, command = ?command, "Command");

        match command {
            Command::Start => {
                if self.store().get_profile(user_id).await?.is_some() {
                    return Ok(OutgoingResponse::text(
                        "You are already registered. Send /profile to see your profile or /update to change it.",
                    ));
                }
                self.search.exit(user_id).await;
                Ok(self.registration.enter(user_id).await)
            }
            Command::Update => {
                self.search.exit(user_id).await;
                Ok(self.registration.enter(user_id).await)
            }
            Command::Search => {
                self.registration.exit(user_id).await;
                Ok(self.search.enter(user_id).await)
            }
            Command::Profile(handle) => self.show_profile(message, handle).await,
            Command::Stats => {
                let stats = self.store().stats().await?;
                Ok(OutgoingResponse::text(format!(
                    "Registered developers: {}\nAverage salary: {:.2}",
                    stats.total, stats.average_salary
                )))
            }
            Command::Cancel => {
                let cancelled =
                    self.registration.exit(user_id).await | self.search.exit(user_id).await;
                let text = if cancelled {
                    "Cancelled. Nothing was saved."
                } else {
                    "There is nothing to cancel."
                };
                Ok(OutgoingResponse::text(text).with_keyboard(Keyboard::Remove))
            }
            Command::Help => Ok(OutgoingResponse::text(help_text())),
            Command::Unknown(name) => {
                warn!(user_id = %user_id, command = %name, "Unknown command");
                Ok(OutgoingResponse::text(format!(
                    "I don't know /{name}. Send /help to see the commands."
                )))
            }
        }
    }

    /// `/profile [@handle]`: the named handle, else the caller's own.
    async fn show_profile(
        &self,
        message: &IncomingMessage,
        handle: Option<String>,
    ) -> Result<OutgoingResponse, Error> {
        let handle = handle.or_else(|| message.handle.clone());
        let profile = match &handle {
            Some(h) => self.store().find_by_handle(h).await?,
            None => self.store().get_profile(&message.user_id).await?,
        };

        let text = match (profile, handle) {
            (Some(p), _) => p.render(),
            (None, Some(h)) if message.handle.as_deref() != Some(h.as_str()) => {
                format!("No profile found for @{h}.")
            }
            (None, _) => "You have no profile yet. Send /start to create one.".to_string(),
        };
        Ok(OutgoingResponse::text(text))
    }
}
