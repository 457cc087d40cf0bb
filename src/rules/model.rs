//! Persisted entities of the rule store.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// A constructed language owned by one user.
///
/// Deleting a language cascades to every [`RuleSet`] whose `language_id`
/// points at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    /// Opaque account identifier of the owner.
    pub user_id: String,
}

/// Upsert form of [`Language`]: `id = None` inserts a new row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDraft {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: String,
}

impl LanguageDraft {
    pub fn new(name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            user_id: user_id.into(),
        }
    }

    pub(crate) fn into_language(self, id: u64) -> Language {
        Language {
            id,
            name: self.name,
            description: self.description,
            user_id: self.user_id,
        }
    }
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// A sound-change rule-set in the engine's rule syntax.
///
/// `content` is opaque to this crate: it is written to the staging area
/// verbatim and never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: u64,
    pub name: Option<String>,
    pub content: String,
    /// Free-form tag such as `"spelling"`, used to filter listings.
    pub role: Option<String>,
    pub language_id: u64,
}

/// Upsert form of [`RuleSet`]: `id = None` inserts, `Some(id)` replaces (or
/// inserts under that id when no such row exists yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetDraft {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    pub language_id: u64,
}

impl RuleSetDraft {
    pub fn new(language_id: u64, content: impl Into<String>) -> Self {
        Self {
            id: None,
            name: None,
            content: content.into(),
            role: None,
            language_id,
        }
    }

    /// Target an existing row.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub(crate) fn into_rule_set(self, id: u64) -> RuleSet {
        RuleSet {
            id,
            name: self.name,
            content: self.content,
            role: self.role,
            language_id: self.language_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_deserialises_without_optional_fields() {
        let draft: RuleSetDraft =
            serde_json::from_str(r#"{"content": "e => a", "language_id": 3}"#).unwrap();
        assert_eq!(draft, RuleSetDraft::new(3, "e => a"));
    }

    #[test]
    fn builder_sets_every_field() {
        let rs = RuleSetDraft::new(7, "o => u")
            .with_id(12)
            .with_name("raising")
            .with_role("spelling")
            .into_rule_set(12);
        assert_eq!(rs.id, 12);
        assert_eq!(rs.name.as_deref(), Some("raising"));
        assert_eq!(rs.role.as_deref(), Some("spelling"));
        assert_eq!(rs.language_id, 7);
    }
}
