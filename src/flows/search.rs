//! Search flow: find developers by city.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::channels::{Keyboard, OutgoingResponse};
use crate::error::FlowError;
use crate::profile::{UserProfile, normalize_city};
use crate::store::ProfileStore;
use crate::wizard::{Flow, Participant, Step, StepOutcome, Suggestions};

/// Search query being assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchDraft {
    /// Normalized city to match.
    pub city: Option<String>,
}

pub struct SearchFlow {
    store: Arc<dyn ProfileStore>,
    steps: Vec<Step<SearchDraft>>,
}

impl SearchFlow {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        let steps = vec![
            Step::new("city", "Which city should I search in?", city)
                .with_suggestions(Suggestions::TopCities)
                .required(),
        ];
        Self { store, steps }
    }
}

fn city(text: &str, draft: &mut SearchDraft) -> StepOutcome {
    let city = normalize_city(text);
    if city.is_empty() {
        return StepOutcome::Retry("Please type a city name.".to_string());
    }
    draft.city = Some(city);
    StepOutcome::Proceed
}

/// One result line: name, handle and stack.
fn summary_line(profile: &UserProfile) -> String {
    let name = [profile.first_name.as_deref(), profile.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let mut line = if name.is_empty() {
        "Anonymous".to_string()
    } else {
        name
    };
    if let Some(handle) = &profile.handle {
        line.push_str(&format!(" (@{handle})"));
    }
    if let Some(stack) = profile.stack.as_ref().filter(|s| !s.is_empty()) {
        line.push_str(&format!(": {}", stack.join(", ")));
    }
    line
}

#[async_trait]
impl Flow for SearchFlow {
    type Draft = SearchDraft;

    fn name(&self) -> &'static str {
        "search"
    }

    fn steps(&self) -> &[Step<SearchDraft>] {
        &self.steps
    }

    async fn commit(
        &self,
        participant: &Participant,
        draft: SearchDraft,
    ) -> Result<OutgoingResponse, FlowError> {
        let city = draft.city.unwrap_or_default();
        let matches = self.store.find_by_city(&city).await.map_err(|e| {
            error!(user_id = %participant.user_id, city = %city, error = %e, "City search failed");
            FlowError::Commit {
                flow: self.name(),
                user_id: participant.user_id.clone(),
                source: e,
            }
        })?;

        info!(user_id = %participant.user_id, city = %city, matches = matches.len(), "City search");

        let content = if matches.is_empty() {
            format!("Nobody from {city} has registered yet.")
        } else {
            let lines: Vec<String> = matches
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{}. {}", i + 1, summary_line(p)))
                .collect();
            format!(
                "Found {} in {city}:\n{}",
                matches.len(),
                lines.join("\n")
            )
        };
        Ok(OutgoingResponse::text(content).with_keyboard(Keyboard::Remove))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::test_support::BrokenStore;
    use crate::profile::ProfilePatch;
    use crate::store::LibSqlBackend;
    use crate::wizard::{StepEngine, StepResult};

    fn searcher() -> Participant {
        Participant::new("9", None)
    }

    async fn seeded() -> Arc<dyn ProfileStore> {
        let store: Arc<dyn ProfileStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let alice = ProfilePatch {
            handle: Some("alice".to_string()),
            first_name: Some("Alice".to_string()),
            city: Some("berlin".to_string()),
            stack: Some(vec!["rust".to_string()]),
            ..Default::default()
        };
        store.upsert_profile("1", &alice).await.unwrap();
        let bob = ProfilePatch {
            city: Some("rome".to_string()),
            ..Default::default()
        };
        store.upsert_profile("2", &bob).await.unwrap();
        store
    }

    async fn search(engine: &StepEngine<SearchFlow>, text: &str) -> Option<StepResult> {
        engine.enter("9").await;
        engine.advance(&searcher(), Some(text)).await.unwrap()
    }

    #[tokio::test]
    async fn prompt_offers_known_cities() {
        let store = seeded().await;
        let engine = StepEngine::new(SearchFlow::new(Arc::clone(&store)), store, "-", 10);
        let prompt = engine.enter("9").await;
        assert_eq!(
            prompt.keyboard,
            Keyboard::Choices(vec!["berlin".to_string(), "rome".to_string()])
        );
        assert!(!prompt.content.contains("to skip"));
    }

    #[tokio::test]
    async fn normalized_queries_match_the_same_records() {
        let store = seeded().await;
        let engine = StepEngine::new(SearchFlow::new(Arc::clone(&store)), store, "-", 10);

        let padded = search(&engine, " Berlin ").await;
        let plain = search(&engine, "berlin").await;
        assert_eq!(padded, plain);
        match padded {
            Some(StepResult::Completed(r)) => {
                assert!(r.content.starts_with("Found 1 in berlin"));
                assert!(r.content.contains("Alice (@alice): rust"));
            }
            other => panic!("expected results, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_text_retries() {
        let store = seeded().await;
        let engine = StepEngine::new(SearchFlow::new(Arc::clone(&store)), store, "-", 10);
        let result = search(&engine, "   ").await;
        assert!(matches!(result, Some(StepResult::Retry(_))));
        assert_eq!(engine.current_step("9").await, Some(0));
    }

    #[tokio::test]
    async fn skip_token_is_not_special() {
        let store = seeded().await;
        let engine = StepEngine::new(SearchFlow::new(Arc::clone(&store)), store, "-", 10);
        let result = search(&engine, "-").await;
        assert!(
            matches!(result, Some(StepResult::Completed(ref r)) if r.content.starts_with("Nobody from -"))
        );
    }

    #[tokio::test]
    async fn zero_matches_is_a_normal_outcome() {
        let store = seeded().await;
        let engine = StepEngine::new(SearchFlow::new(Arc::clone(&store)), store, "-", 10);
        let result = search(&engine, "Oslo").await;
        match result {
            Some(StepResult::Completed(r)) => {
                assert_eq!(r.content, "Nobody from oslo has registered yet.");
            }
            other => panic!("expected empty result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_ends_the_flow_with_an_error() {
        let store: Arc<dyn ProfileStore> = Arc::new(BrokenStore);
        let engine = StepEngine::new(SearchFlow::new(Arc::clone(&store)), store, "-", 10);
        let prompt = engine.enter("9").await;
        assert_eq!(prompt.keyboard, Keyboard::Remove);

        let err = engine.advance(&searcher(), Some("oslo")).await.unwrap_err();
        assert!(matches!(err, FlowError::Commit { flow: "search", .. }));
        assert!(!engine.is_active("9").await);
    }
}
