//! Top-Cities suggestions shared by the registration and search flows.

use tracing::warn;

use crate::store::ProfileStore;

/// The most common stored cities, most frequent first.
///
/// A store failure yields no suggestions; callers fall back to free text.
pub async fn suggest(store: &dyn ProfileStore, limit: usize) -> Vec<String> {
    match store.top_cities(limit).await {
        Ok(cities) => cities.into_iter().map(|c| c.city).collect(),
        Err(e) => {
            warn!(error = %e, "Top cities unavailable, prompting for free text");
            Vec::new()
        }
    }
}
