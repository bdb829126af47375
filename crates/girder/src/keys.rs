//! Project keys and work-item key formatting.
//!
//! Every project carries a short uppercase key (`DEMO`, `INFRA`). Work items
//! get sequential keys `<ProjectKey>-<N>` where `N` comes from a per-project
//! counter owned by the store. Key numbers are allocated under the store's
//! lock and never reused, so deleting `DEMO-3` leaves a permanent gap.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum project key length.
pub const PROJECT_KEY_MIN: usize = 2;
/// Maximum project key length.
pub const PROJECT_KEY_MAX: usize = 10;

/// Fallback stem when a project name yields no usable characters.
const FALLBACK_STEM: &str = "PROJ";

/// How many leading characters of a name seed a derived key.
const DERIVED_STEM_LEN: usize = 4;

/// A validated project key: 2-10 uppercase alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectKey(String);

impl ProjectKey {
    /// Parse and validate a project key.
    pub fn parse(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let len = s.chars().count();
        let well_formed = (PROJECT_KEY_MIN..=PROJECT_KEY_MAX).contains(&len)
            && s.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if well_formed {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidProjectKey(s))
        }
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Format the work-item key for the given sequence number.
    pub fn item_key(&self, n: u64) -> String {
        format!("{}-{n}", self.0)
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ProjectKey {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ProjectKey> for String {
    fn from(key: ProjectKey) -> Self {
        key.0
    }
}

/// Derive a unique project key from a project name.
///
/// Takes the first few alphanumeric characters of the name uppercased, falls
/// back to `PROJ` for names with nothing usable, and appends a numeric
/// suffix until `is_taken` stops objecting.
pub fn derive_project_key(name: &str, mut is_taken: impl FnMut(&str) -> bool) -> ProjectKey {
    let stem: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(DERIVED_STEM_LEN)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let stem = if stem.chars().count() < PROJECT_KEY_MIN {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };

    if !is_taken(&stem) {
        // Derived stems are always valid: uppercase alphanumeric, 2-10 chars.
        return ProjectKey(stem);
    }

    let mut counter = 1u32;
    loop {
        let candidate = format!("{stem}{counter}");
        if !is_taken(&candidate) {
            return ProjectKey(candidate);
        }
        counter += 1;
    }
}
