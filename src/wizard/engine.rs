//! StepEngine: drives one flow for many conversations, one message at a time.
//!
//! The wait between turns lives entirely in the stored step index and draft:
//! `advance` never blocks for input, it returns after every message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::channels::{Keyboard, OutgoingResponse};
use crate::error::FlowError;
use crate::flows::top_cities;
use crate::store::ProfileStore;

use super::step::{Step, StepOutcome, Suggestions};

/// Who a conversation belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Platform identity; also the conversation key.
    pub user_id: String,
    pub handle: Option<String>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, handle: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            handle,
        }
    }
}

/// A fixed sequence of steps plus what to do with the finished draft.
#[async_trait]
pub trait Flow: Send + Sync {
    /// Per-conversation state accumulated across steps.
    type Draft: Default + Clone + Send + Sync;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn steps(&self) -> &[Step<Self::Draft>];

    /// Text placed before the first prompt.
    fn intro(&self) -> Option<&'static str> {
        None
    }

    /// Consume a completed draft and produce the final reply.
    async fn commit(
        &self,
        participant: &Participant,
        draft: Self::Draft,
    ) -> Result<OutgoingResponse, FlowError>;
}

/// In-flight state of one conversation.
#[derive(Debug, Clone)]
pub struct Session<D> {
    pub step: usize,
    pub draft: D,
    pub last_active: Instant,
}

impl<D: Default> Session<D> {
    fn new() -> Self {
        Self {
            step: 0,
            draft: D::default(),
            last_active: Instant::now(),
        }
    }
}

/// Result of feeding one inbound message to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The answer was accepted; this is the next prompt.
    Next(OutgoingResponse),
    /// The answer was rejected; this re-issues the same prompt.
    Retry(OutgoingResponse),
    /// The last step was accepted and the draft committed.
    Completed(OutgoingResponse),
    /// A step ended the flow; the draft was discarded.
    Aborted(OutgoingResponse),
}

/// Generic driver for a [`Flow`].
pub struct StepEngine<F: Flow> {
    flow: F,
    store: Arc<dyn ProfileStore>,
    skip_token: String,
    top_cities_limit: usize,
    sessions: RwLock<HashMap<String, Session<F::Draft>>>,
}

impl<F: Flow> StepEngine<F> {
    pub fn new(
        flow: F,
        store: Arc<dyn ProfileStore>,
        skip_token: impl Into<String>,
        top_cities_limit: usize,
    ) -> Self {
        Self {
            flow,
            store,
            skip_token: skip_token.into(),
            top_cities_limit,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn flow(&self) -> &F {
        &self.flow
    }

    /// Start the flow at step 0, replacing any draft this conversation had.
    ///
    /// Returns the first prompt.
    pub async fn enter(&self, user_id: &str) -> OutgoingResponse {
        let replaced = self
            .sessions
            .write()
            .await
            .insert(user_id.to_string(), Session::new())
            .is_some();

        info!(user_id = %user_id, flow = self.flow.name(), replaced, "Flow entered");

        let prompt = self.render_prompt(0).await;
        match self.flow.intro() {
            Some(intro) => OutgoingResponse {
                content: format!("{intro}\n\n{}", prompt.content),
                ..prompt
            },
            None => prompt,
        }
    }

    /// Feed one inbound message to the conversation's current step.
    ///
    /// Returns `Ok(None)` when the conversation has no active draft. The draft
    /// is released before committing, so a failed commit also ends the flow.
    pub async fn advance(
        &self,
        participant: &Participant,
        text: Option<&str>,
    ) -> Result<Option<StepResult>, FlowError> {
        let steps = self.flow.steps();

        let (step_index, outcome, completed) = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(&participant.user_id) else {
                return Ok(None);
            };
            session.last_active = Instant::now();

            let step_index = session.step;
            let Some(step) = steps.get(step_index) else {
                // Unreachable unless the flow shrank; treat as finished.
                let session = sessions.remove(&participant.user_id);
                drop(sessions);
                return self
                    .finish(participant, session.map(|s| s.draft).unwrap_or_default())
                    .await
                    .map(Some);
            };

            let outcome = match text.map(str::trim) {
                None => StepOutcome::Retry("Please answer with a text message.".to_string()),
                Some(t) if step.skippable && t == self.skip_token => StepOutcome::Proceed,
                Some(t) => {
                    // Handlers work on a scratch copy so a rejected answer leaves no trace.
                    let mut scratch = session.draft.clone();
                    let outcome = (step.handler)(t, &mut scratch);
                    if outcome == StepOutcome::Proceed {
                        session.draft = scratch;
                    }
                    outcome
                }
            };

            let mut completed = None;
            match &outcome {
                StepOutcome::Proceed => {
                    session.step += 1;
                    if session.step >= steps.len() {
                        completed = sessions.remove(&participant.user_id).map(|s| s.draft);
                    }
                }
                StepOutcome::Retry(_) => {}
                StepOutcome::Abort(_) => {
                    sessions.remove(&participant.user_id);
                }
            }
            (step_index, outcome, completed)
        };

        debug!(
            user_id = %participant.user_id,
            flow = self.flow.name(),
            step = step_index,
            field = steps[step_index].field,
            outcome = ?outcome,
            "Step handled"
        );

        let result = match outcome {
            StepOutcome::Proceed => match completed {
                Some(draft) => return self.finish(participant, draft).await.map(Some),
                None => StepResult::Next(self.render_prompt(step_index + 1).await),
            },
            StepOutcome::Retry(message) => {
                let prompt = self.render_prompt(step_index).await;
                StepResult::Retry(OutgoingResponse {
                    content: format!("{message}\n\n{}", prompt.content),
                    ..prompt
                })
            }
            StepOutcome::Abort(message) => {
                info!(user_id = %participant.user_id, flow = self.flow.name(), "Flow aborted");
                StepResult::Aborted(OutgoingResponse::text(message).with_keyboard(Keyboard::Remove))
            }
        };
        Ok(Some(result))
    }

    /// Current step index, or `None` without an active draft.
    pub async fn current_step(&self, user_id: &str) -> Option<usize> {
        self.sessions.read().await.get(user_id).map(|s| s.step)
    }

    pub async fn is_active(&self, user_id: &str) -> bool {
        self.sessions.read().await.contains_key(user_id)
    }

    /// Snapshot of a conversation's draft.
    pub async fn draft(&self, user_id: &str) -> Option<F::Draft> {
        self.sessions
            .read()
            .await
            .get(user_id)
            .map(|s| s.draft.clone())
    }

    /// Discard a conversation's draft. Returns whether one existed.
    pub async fn exit(&self, user_id: &str) -> bool {
        let existed = self.sessions.write().await.remove(user_id).is_some();
        if existed {
            info!(user_id = %user_id, flow = self.flow.name(), "Flow exited");
        }
        existed
    }

    /// Evict drafts idle for longer than `idle_timeout`. Returns how many.
    pub async fn prune_stale(&self, idle_timeout: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active.elapsed() < idle_timeout);
        let pruned = before - sessions.len();
        if pruned > 0 {
            info!(flow = self.flow.name(), pruned, "Pruned idle drafts");
        }
        pruned
    }

    async fn finish(
        &self,
        participant: &Participant,
        draft: F::Draft,
    ) -> Result<StepResult, FlowError> {
        let reply = self.flow.commit(participant, draft).await?;
        info!(user_id = %participant.user_id, flow = self.flow.name(), "Flow completed");
        Ok(StepResult::Completed(reply))
    }

    /// The prompt for a step, with its suggestion keyboard when one is available.
    async fn render_prompt(&self, index: usize) -> OutgoingResponse {
        let Some(step) = self.flow.steps().get(index) else {
            return OutgoingResponse::text("");
        };

        let mut content = step.prompt.to_string();
        if step.skippable {
            content.push_str(&format!(" (send {} to skip)", self.skip_token));
        }

        let choices = match step.suggestions {
            Suggestions::None => Vec::new(),
            Suggestions::TopCities => {
                top_cities::suggest(self.store.as_ref(), self.top_cities_limit).await
            }
        };

        let keyboard = if choices.is_empty() {
            Keyboard::Remove
        } else {
            Keyboard::Choices(choices)
        };
        OutgoingResponse::text(content).with_keyboard(keyboard)
    }
}
