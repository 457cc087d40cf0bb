//! Rule store: languages and the sound-change rule-sets attached to them.
//!
//! * [`RuleSet`] / [`RuleSetDraft`] — a persisted rule-set and its upsert form.
//! * [`Language`] / [`LanguageDraft`] — the owning language (cascade root).
//! * [`RuleStore`] — object-safe storage trait used by the orchestrator.
//! * [`JsonRuleStore`] — JSON-file backed implementation (in-memory mode for
//!   tests).
//! * [`StoreError`] — error variants for store operations.
//!
//! # Quick start
//!
//! ```rust
//! use conlang_sc::rules::{JsonRuleStore, LanguageDraft, RuleSetDraft, RuleStore};
//!
//! let store = JsonRuleStore::in_memory();
//! let lang = store
//!     .upsert_language(LanguageDraft::new("Proto-Tala", "user-1"))
//!     .unwrap();
//! let rules = store
//!     .upsert(RuleSetDraft::new(lang.id, "raise-e:\n    e => a"))
//!     .unwrap();
//! assert_eq!(store.get(rules.id).unwrap().content, rules.content);
//! ```

pub mod model;
pub mod store;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use model::{Language, LanguageDraft, RuleSet, RuleSetDraft};
pub use store::{JsonRuleStore, RuleStore, StoreError};
