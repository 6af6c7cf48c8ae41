//! Environment identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of one environment, fixed for its lifetime.
///
/// Either supplied by the caller or generated as `env_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("env_{}", Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case alphanumeric form usable in database, bucket and
    /// container names.
    pub fn slug(&self) -> String {
        let slug: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        slug.trim_matches('_').to_string()
    }
}

impl Default for EnvironmentId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EnvironmentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EnvironmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = EnvironmentId::generate();
        let b = EnvironmentId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("env_"));
    }

    #[test]
    fn test_slug_replaces_separators() {
        let id = EnvironmentId::new("My-Suite.42");
        assert_eq!(id.slug(), "my_suite_42");
    }
}
