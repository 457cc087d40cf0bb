//! [`RuleStore`] trait and the JSON-file backed [`JsonRuleStore`].
//!
//! The whole store is one JSON document.  Every mutation is applied to a copy
//! of the in-memory state, written to a temp file next to the target and
//! renamed over it; the in-memory state is only replaced once the write has
//! succeeded, so a failed save leaves both disk and memory unchanged.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::model::{Language, LanguageDraft, RuleSet, RuleSetDraft};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors that can arise from the rule store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule-set {0} not found")]
    RuleSetNotFound(u64),

    #[error("language {0} not found")]
    LanguageNotFound(u64),

    /// At least one target rule-set belongs to a language of another user.
    #[error("user {user_id} does not own rule-set(s) {rule_set_ids:?}")]
    Unauthorized {
        user_id: String,
        rule_set_ids: Vec<u64>,
    },

    #[error("store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store file {path} is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An explicit id leaves no room for the next allocated one.
    #[error("id {0} is out of range")]
    InvalidId(u64),

    #[error("rule store lock poisoned")]
    Poisoned,
}

// ---------------------------------------------------------------------------
// RuleStore trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe storage for languages and rule-sets.
///
/// Ownership is *not* enforced by the mutating methods; callers acting on
/// behalf of a user run [`verify_ownership`](RuleStore::verify_ownership)
/// first.
pub trait RuleStore: Send + Sync {
    /// Insert (`id = None`) or replace (`id = Some`) a rule-set.
    ///
    /// Fails with [`StoreError::LanguageNotFound`] when `language_id` does
    /// not exist.
    fn upsert(&self, draft: RuleSetDraft) -> Result<RuleSet, StoreError> {
        let mut saved = self.upsert_many(vec![draft])?;
        Ok(saved.remove(0))
    }

    /// Apply every draft in order and persist once.  Either all drafts are
    /// stored or none are.
    fn upsert_many(&self, drafts: Vec<RuleSetDraft>) -> Result<Vec<RuleSet>, StoreError>;

    fn get(&self, id: u64) -> Result<RuleSet, StoreError>;

    /// Rule-sets of one language, ordered by id, optionally filtered by role.
    fn list(&self, language_id: u64, role: Option<&str>) -> Result<Vec<RuleSet>, StoreError>;

    /// Rule-sets of every language owned by `user_id`, ordered by id.
    fn list_for_user(&self, user_id: &str, role: Option<&str>)
        -> Result<Vec<RuleSet>, StoreError>;

    fn upsert_language(&self, draft: LanguageDraft) -> Result<Language, StoreError>;

    fn get_language(&self, id: u64) -> Result<Language, StoreError>;

    /// Remove a language together with all of its rule-sets.
    fn delete_language(&self, id: u64) -> Result<(), StoreError>;

    /// Fail with [`StoreError::Unauthorized`] when any existing rule-set in
    /// `rule_set_ids` belongs to a language not owned by `user_id`.  Ids that
    /// do not exist yet are ignored.
    fn verify_ownership(&self, user_id: &str, rule_set_ids: &[u64]) -> Result<(), StoreError>;
}

// Compile-time assertion: Box<dyn RuleStore> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RuleStore>) {}
};

// ---------------------------------------------------------------------------
// StoreData  (on-disk document)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    next_language_id: u64,
    next_rule_set_id: u64,
    languages: BTreeMap<u64, Language>,
    rule_sets: BTreeMap<u64, RuleSet>,
}

impl StoreData {
    fn allocate_rule_set_id(&mut self, requested: Option<u64>) -> Result<u64, StoreError> {
        allocate(&mut self.next_rule_set_id, requested)
    }

    fn allocate_language_id(&mut self, requested: Option<u64>) -> Result<u64, StoreError> {
        allocate(&mut self.next_language_id, requested)
    }
}

/// Ids start at 1; an explicit id moves the counter past it.
fn allocate(next: &mut u64, requested: Option<u64>) -> Result<u64, StoreError> {
    let id = match requested {
        Some(id) => id,
        None => (*next).max(1),
    };
    let after = id.checked_add(1).ok_or(StoreError::InvalidId(id))?;
    *next = (*next).max(after);
    Ok(id)
}

fn matches_role(rule_set: &RuleSet, role: Option<&str>) -> bool {
    match role {
        Some(role) => rule_set.role.as_deref() == Some(role),
        None => true,
    }
}

// ---------------------------------------------------------------------------
// JsonRuleStore
// ---------------------------------------------------------------------------

/// [`RuleStore`] persisted as a single pretty-printed JSON file.
///
/// # Example
/// ```rust,no_run
/// use conlang_sc::rules::{JsonRuleStore, RuleStore};
///
/// let store = JsonRuleStore::open("/tmp/conlang/rules.json").unwrap();
/// let spelling = store.list(1, Some("spelling")).unwrap();
/// ```
pub struct JsonRuleStore {
    data: Mutex<StoreData>,
    /// `None` for a purely in-memory store.
    path: Option<PathBuf>,
}

impl std::fmt::Debug for JsonRuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRuleStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonRuleStore {
    /// Open the store at `path`, starting empty when the file does not
    /// exist yet.  The file is created on the first mutation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            StoreData::default()
        };

        log::debug!(
            "rule store: opened {} ({} languages, {} rule-sets)",
            path.display(),
            data.languages.len(),
            data.rule_sets.len()
        );

        Ok(Self {
            data: Mutex::new(data),
            path: Some(path),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(StoreData::default()),
            path: None,
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> Result<T, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&data))
    }

    /// Run `f` against a copy of the state, persist the copy, then commit it.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = data.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *data = next;
        Ok(out)
    }

    fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(data).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl RuleStore for JsonRuleStore {
    fn upsert_many(&self, drafts: Vec<RuleSetDraft>) -> Result<Vec<RuleSet>, StoreError> {
        let saved = self.mutate(|data| {
            let mut saved = Vec::with_capacity(drafts.len());
            for draft in drafts {
                if !data.languages.contains_key(&draft.language_id) {
                    return Err(StoreError::LanguageNotFound(draft.language_id));
                }
                let id = data.allocate_rule_set_id(draft.id)?;
                let rule_set = draft.into_rule_set(id);
                data.rule_sets.insert(id, rule_set.clone());
                saved.push(rule_set);
            }
            Ok(saved)
        })?;

        log::debug!(
            "rule store: upserted rule-set(s) {:?}",
            saved.iter().map(|r| r.id).collect::<Vec<_>>()
        );
        Ok(saved)
    }

    fn get(&self, id: u64) -> Result<RuleSet, StoreError> {
        self.read(|data| data.rule_sets.get(&id).cloned())?
            .ok_or(StoreError::RuleSetNotFound(id))
    }

    fn list(&self, language_id: u64, role: Option<&str>) -> Result<Vec<RuleSet>, StoreError> {
        self.read(|data| {
            data.rule_sets
                .values()
                .filter(|r| r.language_id == language_id && matches_role(r, role))
                .cloned()
                .collect()
        })
    }

    fn list_for_user(
        &self,
        user_id: &str,
        role: Option<&str>,
    ) -> Result<Vec<RuleSet>, StoreError> {
        self.read(|data| {
            data.rule_sets
                .values()
                .filter(|r| {
                    data.languages
                        .get(&r.language_id)
                        .is_some_and(|l| l.user_id == user_id)
                })
                .filter(|r| matches_role(r, role))
                .cloned()
                .collect()
        })
    }

    fn upsert_language(&self, draft: LanguageDraft) -> Result<Language, StoreError> {
        let language = self.mutate(|data| {
            let id = data.allocate_language_id(draft.id)?;
            let language = draft.into_language(id);
            data.languages.insert(id, language.clone());
            Ok(language)
        })?;
        log::debug!("rule store: upserted language {}", language.id);
        Ok(language)
    }

    fn get_language(&self, id: u64) -> Result<Language, StoreError> {
        self.read(|data| data.languages.get(&id).cloned())?
            .ok_or(StoreError::LanguageNotFound(id))
    }

    fn delete_language(&self, id: u64) -> Result<(), StoreError> {
        let removed = self.mutate(|data| {
            if data.languages.remove(&id).is_none() {
                return Err(StoreError::LanguageNotFound(id));
            }
            let before = data.rule_sets.len();
            data.rule_sets.retain(|_, r| r.language_id != id);
            Ok(before - data.rule_sets.len())
        })?;
        log::info!("rule store: deleted language {id} and {removed} rule-set(s)");
        Ok(())
    }

    fn verify_ownership(&self, user_id: &str, rule_set_ids: &[u64]) -> Result<(), StoreError> {
        let foreign: Vec<u64> = self.read(|data| {
            rule_set_ids
                .iter()
                .copied()
                .filter(|id| {
                    data.rule_sets.get(id).is_some_and(|r| {
                        data.languages
                            .get(&r.language_id)
                            .map_or(true, |l| l.user_id != user_id)
                    })
                })
                .collect()
        })?;

        if foreign.is_empty() {
            Ok(())
        } else {
            log::warn!("rule store: user {user_id} denied access to {foreign:?}");
            Err(StoreError::Unauthorized {
                user_id: user_id.to_string(),
                rule_set_ids: foreign,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_with_language(user: &str) -> (JsonRuleStore, Language) {
        let store = JsonRuleStore::in_memory();
        let lang = store
            .upsert_language(LanguageDraft::new("Proto-Tala", user))
            .unwrap();
        (store, lang)
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let (store, lang) = store_with_language("alice");
        let saved = store
            .upsert(RuleSetDraft::new(lang.id, "e => a").with_role("spelling"))
            .unwrap();

        let loaded = store.get(saved.id).unwrap();
        assert_eq!(loaded.content, "e => a");
        assert_eq!(loaded.role.as_deref(), Some("spelling"));
        assert_eq!(loaded.language_id, lang.id);
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (store, lang) = store_with_language("alice");
        let a = store.upsert(RuleSetDraft::new(lang.id, "a")).unwrap();
        let b = store.upsert(RuleSetDraft::new(lang.id, "b")).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn upsert_with_id_replaces_row() {
        let (store, lang) = store_with_language("alice");
        let first = store.upsert(RuleSetDraft::new(lang.id, "e => a")).unwrap();
        let replaced = store
            .upsert(RuleSetDraft::new(lang.id, "e => i").with_id(first.id))
            .unwrap();

        assert_eq!(replaced.id, first.id);
        assert_eq!(store.get(first.id).unwrap().content, "e => i");
        assert_eq!(store.list(lang.id, None).unwrap().len(), 1);
    }

    #[test]
    fn upsert_with_unknown_id_inserts_and_advances_counter() {
        let (store, lang) = store_with_language("alice");
        store
            .upsert(RuleSetDraft::new(lang.id, "x").with_id(10))
            .unwrap();
        let next = store.upsert(RuleSetDraft::new(lang.id, "y")).unwrap();
        assert_eq!(next.id, 11);
    }

    #[test]
    fn max_id_is_rejected_and_store_stays_usable() {
        let (store, lang) = store_with_language("alice");
        let err = store
            .upsert(RuleSetDraft::new(lang.id, "x").with_id(u64::MAX))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(u64::MAX)));

        // Nothing was written and the lock is still healthy.
        assert!(store.list(lang.id, None).unwrap().is_empty());
        let next = store.upsert(RuleSetDraft::new(lang.id, "y")).unwrap();
        assert_eq!(next.id, 1);

        let err = store
            .upsert_language(LanguageDraft {
                id: Some(u64::MAX),
                ..LanguageDraft::new("Overflow", "alice")
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(u64::MAX)));
    }

    #[test]
    fn id_just_below_max_is_accepted() {
        let (store, lang) = store_with_language("alice");
        let saved = store
            .upsert(RuleSetDraft::new(lang.id, "x").with_id(u64::MAX - 1))
            .unwrap();
        assert_eq!(saved.id, u64::MAX - 1);
    }

    #[test]
    fn upsert_for_missing_language_fails() {
        let store = JsonRuleStore::in_memory();
        let err = store.upsert(RuleSetDraft::new(99, "e => a")).unwrap_err();
        assert!(matches!(err, StoreError::LanguageNotFound(99)));
    }

    #[test]
    fn upsert_many_is_all_or_nothing() {
        let (store, lang) = store_with_language("alice");
        let err = store
            .upsert_many(vec![
                RuleSetDraft::new(lang.id, "ok"),
                RuleSetDraft::new(lang.id + 100, "bad"),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::LanguageNotFound(_)));
        assert!(store.list(lang.id, None).unwrap().is_empty());
    }

    #[test]
    fn get_missing_is_not_found() {
        let store = JsonRuleStore::in_memory();
        let err = store.get(42).unwrap_err();
        assert!(matches!(err, StoreError::RuleSetNotFound(42)));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn list_filters_by_language_and_role() {
        let (store, lang) = store_with_language("alice");
        let other = store
            .upsert_language(LanguageDraft::new("Kesh", "alice"))
            .unwrap();
        store
            .upsert(RuleSetDraft::new(lang.id, "a").with_role("spelling"))
            .unwrap();
        store.upsert(RuleSetDraft::new(lang.id, "b")).unwrap();
        store
            .upsert(RuleSetDraft::new(other.id, "c").with_role("spelling"))
            .unwrap();

        let all = store.list(lang.id, None).unwrap();
        assert_eq!(
            all.iter().map(|r| r.content.as_str()).collect::<Vec<_>>(),
            ["a", "b"]
        );

        let spelling = store.list(lang.id, Some("spelling")).unwrap();
        assert_eq!(spelling.len(), 1);
        assert_eq!(spelling[0].content, "a");
    }

    #[test]
    fn list_for_user_spans_owned_languages_only() {
        let (store, lang) = store_with_language("alice");
        let bobs = store
            .upsert_language(LanguageDraft::new("Vethic", "bob"))
            .unwrap();
        store.upsert(RuleSetDraft::new(lang.id, "mine")).unwrap();
        store.upsert(RuleSetDraft::new(bobs.id, "theirs")).unwrap();

        let alice = store.list_for_user("alice", None).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].content, "mine");
        assert!(store.list_for_user("alice", Some("spelling")).unwrap().is_empty());
    }

    #[test]
    fn delete_language_cascades() {
        let (store, lang) = store_with_language("alice");
        let rs = store.upsert(RuleSetDraft::new(lang.id, "e => a")).unwrap();

        store.delete_language(lang.id).unwrap();

        assert!(matches!(
            store.get_language(lang.id),
            Err(StoreError::LanguageNotFound(_))
        ));
        assert!(matches!(store.get(rs.id), Err(StoreError::RuleSetNotFound(_))));
    }

    #[test]
    fn delete_missing_language_is_not_found() {
        let store = JsonRuleStore::in_memory();
        assert!(matches!(
            store.delete_language(5),
            Err(StoreError::LanguageNotFound(5))
        ));
    }

    #[test]
    fn verify_ownership_rejects_foreign_rule_sets() {
        let (store, lang) = store_with_language("alice");
        let rs = store.upsert(RuleSetDraft::new(lang.id, "e => a")).unwrap();

        assert!(store.verify_ownership("alice", &[rs.id]).is_ok());

        let err = store.verify_ownership("mallory", &[rs.id]).unwrap_err();
        match err {
            StoreError::Unauthorized { rule_set_ids, .. } => assert_eq!(rule_set_ids, [rs.id]),
            other => panic!("expected Unauthorized, got {other:?}"),
        }
    }

    #[test]
    fn verify_ownership_ignores_unknown_ids() {
        let store = JsonRuleStore::in_memory();
        assert!(store.verify_ownership("anyone", &[1, 2, 3]).is_ok());
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("rules.json");

        let id = {
            let store = JsonRuleStore::open(&path).unwrap();
            let lang = store
                .upsert_language(LanguageDraft::new("Proto-Tala", "alice"))
                .unwrap();
            store
                .upsert(RuleSetDraft::new(lang.id, "e => a").with_name("raising"))
                .unwrap()
                .id
        };

        let reloaded = JsonRuleStore::open(&path).unwrap();
        let rs = reloaded.get(id).unwrap();
        assert_eq!(rs.content, "e => a");
        assert_eq!(rs.name.as_deref(), Some("raising"));

        // Counters survive the reload too.
        let lang_id = rs.language_id;
        let next = reloaded.upsert(RuleSetDraft::new(lang_id, "o => u")).unwrap();
        assert_eq!(next.id, id + 1);
    }

    #[test]
    fn open_corrupt_file_fails() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonRuleStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn in_memory_store_has_no_path() {
        assert!(JsonRuleStore::in_memory().path().is_none());
    }
}
