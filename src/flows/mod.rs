//! Concrete conversational flows built on the step engine.

pub mod registration;
pub mod search;
pub mod top_cities;

pub use registration::{RegistrationDraft, RegistrationFlow};
pub use search::{SearchDraft, SearchFlow};
