//! Profile data: the stored record, partial updates, and aggregates.

pub mod model;

pub use model::{
    CityCount, MAX_EXPERIENCE_MONTHS, MAX_SALARY, PLACEHOLDER, ProfilePatch, ProfileStats, UserProfile, format_experience,
    normalize_city, split_tags,
};
