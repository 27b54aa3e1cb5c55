//! User profile records and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shown in place of a field the user never filled in.
pub const PLACEHOLDER: &str = "not specified";

/// Largest experience a user can enter, in months (100 years).
pub const MAX_EXPERIENCE_MONTHS: i64 = 1200;

/// Largest salary a user can enter.
pub const MAX_SALARY: i64 = 1_000_000_000;

/// One stored profile per platform identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable platform user id (primary key).
    pub identity: String,
    /// Display name used for `/profile @handle` lookups, stored without `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    /// Always lowercase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_months: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_experience_update: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    /// Render every field for the `/profile` command.
    pub fn render(&self) -> String {
        let handle = self.handle.as_ref().map(|h| format!("@{h}"));
        let full_name = match (&self.first_name, &self.last_name) {
            (None, None) => None,
            (first, last) => Some(
                [first.as_deref(), last.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        };
        let experience = self.experience_months.map(format_experience);

        let lines = [
            ("Handle", handle),
            ("Name", full_name),
            ("Age", self.age.map(|a| a.to_string())),
            ("City", self.city.clone()),
            ("Stack", self.stack.as_ref().map(|s| s.join(", "))),
            ("Experience", experience),
            ("Salary", self.salary.map(|s| s.to_string())),
            ("Company", self.company.clone()),
            ("Interests", self.interests.as_ref().map(|i| i.join(", "))),
        ];

        let mut parts = vec!["Profile".to_string()];
        for (label, value) in lines {
            let value = value.filter(|v| !v.is_empty());
            parts.push(format!(
                "{label}: {}",
                value.as_deref().unwrap_or(PLACEHOLDER)
            ));
        }
        parts.join("\n")
    }
}

/// "2 years 3 months" style rendering of a month count.
pub fn format_experience(months: i64) -> String {
    let years = months / 12;
    let rest = months % 12;
    match (years, rest) {
        (0, m) => format!("{m} months"),
        (y, 0) => format!("{y} years"),
        (y, m) => format!("{y} years {m} months"),
    }
}

/// A partial profile. `None` fields are left as stored on upsert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub handle: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<i64>,
    pub city: Option<String>,
    pub stack: Option<Vec<String>>,
    pub experience_months: Option<i64>,
    pub salary: Option<i64>,
    pub company: Option<String>,
    pub interests: Option<Vec<String>>,
    pub last_experience_update: Option<DateTime<Utc>>,
}

/// Lowercase and trim a city name for storage and lookup.
pub fn normalize_city(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Split comma-separated input into trimmed, non-empty tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A city and the number of profiles that list it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCount {
    pub city: String,
    pub count: i64,
}

/// Aggregate figures reported by `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total: i64,
    /// Mean salary over profiles that have one, 0 when none do.
    pub average_salary: f64,
}
