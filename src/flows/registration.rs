//! Registration flow: collects a developer profile one field at a time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::error;

use crate::channels::{Keyboard, OutgoingResponse};
use crate::error::FlowError;
use crate::profile::{
    MAX_EXPERIENCE_MONTHS, MAX_SALARY, ProfilePatch, normalize_city, split_tags,
};
use crate::store::ProfileStore;
use crate::wizard::{Flow, Participant, Step, StepOutcome, Suggestions, parse_bounded};

/// Fields gathered so far. Unset fields keep their stored value on commit.
pub type RegistrationDraft = ProfilePatch;

pub struct RegistrationFlow {
    store: Arc<dyn ProfileStore>,
    steps: Vec<Step<RegistrationDraft>>,
}

impl RegistrationFlow {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        let steps = vec![
            Step::new("first_name", "What is your first name?", first_name),
            Step::new("last_name", "What is your last name?", last_name),
            Step::new("age", "How old are you?", age),
            Step::new(
                "city",
                "Which city do you live in? Pick one or type your own.",
                city,
            )
            .with_suggestions(Suggestions::TopCities),
            Step::new(
                "stack",
                "Which technologies do you work with? Separate them with commas.",
                stack,
            ),
            Step::new(
                "experience_months",
                "How many months of professional experience do you have?",
                experience_months,
            ),
            Step::new("salary", "What is your monthly salary?", salary),
            Step::new("company", "Where do you work?", company),
            Step::new(
                "interests",
                "What are you interested in? Separate them with commas.",
                interests,
            ),
        ];
        Self { store, steps }
    }
}

#[async_trait]
impl Flow for RegistrationFlow {
    type Draft = RegistrationDraft;

    fn name(&self) -> &'static str {
        "registration"
    }

    fn steps(&self) -> &[Step<RegistrationDraft>] {
        &self.steps
    }

    fn intro(&self) -> Option<&'static str> {
        Some("Let's fill in your developer profile.")
    }

    async fn commit(
        &self,
        participant: &Participant,
        mut draft: RegistrationDraft,
    ) -> Result<OutgoingResponse, FlowError> {
        draft.handle = participant.handle.clone();
        draft.last_experience_update = Some(Utc::now());

        if let Err(e) = self.store.upsert_profile(&participant.user_id, &draft).await {
            error!(user_id = %participant.user_id, error = %e, "Failed to save profile");
            return Err(FlowError::Commit {
                flow: self.name(),
                user_id: participant.user_id.clone(),
                source: e,
            });
        }

        Ok(
            OutgoingResponse::text("Your profile is saved. Send /profile to see it.")
                .with_keyboard(Keyboard::Remove),
        )
    }
}

fn text_field(text: &str, slot: &mut Option<String>) -> StepOutcome {
    if text.is_empty() {
        return StepOutcome::Retry("Please type an answer.".to_string());
    }
    *slot = Some(text.to_string());
    StepOutcome::Proceed
}

fn tags_field(text: &str, slot: &mut Option<Vec<String>>) -> StepOutcome {
    let tags = split_tags(text);
    if tags.is_empty() {
        return StepOutcome::Retry("Please list at least one item.".to_string());
    }
    *slot = Some(tags);
    StepOutcome::Proceed
}

fn first_name(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    text_field(text, &mut draft.first_name)
}

fn last_name(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    text_field(text, &mut draft.last_name)
}

fn age(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    match parse_bounded(text, 0, 150) {
        Some(n) => {
            draft.age = Some(n);
            StepOutcome::Proceed
        }
        None => StepOutcome::Retry("Age must be a whole number from 0 to 150.".to_string()),
    }
}

fn city(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    let city = normalize_city(text);
    text_field(&city, &mut draft.city)
}

fn stack(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    tags_field(text, &mut draft.stack)
}

fn experience_months(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    match parse_bounded(text, 0, MAX_EXPERIENCE_MONTHS) {
        Some(n) => {
            draft.experience_months = Some(n);
            StepOutcome::Proceed
        }
        None => StepOutcome::Retry(format!(
            "Experience must be a whole number of months from 0 to {MAX_EXPERIENCE_MONTHS}."
        )),
    }
}

fn salary(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    match parse_bounded(text, 0, MAX_SALARY) {
        Some(n) => {
            draft.salary = Some(n);
            StepOutcome::Proceed
        }
        None => StepOutcome::Retry(format!(
            "Salary must be a whole number from 0 to {MAX_SALARY}."
        )),
    }
}

fn company(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    text_field(text, &mut draft.company)
}

fn interests(text: &str, draft: &mut RegistrationDraft) -> StepOutcome {
    tags_field(text, &mut draft.interests)
}
