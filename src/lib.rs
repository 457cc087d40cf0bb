//! Sound-change service for a constructed-language authoring tool.
//!
//! Stores languages and their sound-change rule-sets, and applies a rule-set
//! to a word list by running an external sound-change engine (Lexurgy's
//! `sc` command) in a private staging directory.
//!
//! * [`config`]   — `settings.toml` persistence and platform paths.
//! * [`rules`]    — languages, rule-sets and the JSON rule store.
//! * [`staging`]  — per-run staging directories.
//! * [`engine`]   — engine subprocess supervision and completion detection.
//! * [`pipeline`] — the apply workflow tying the above together.
//! * [`error`]    — crate-level error taxonomy.

pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod rules;
pub mod staging;

#[cfg(all(test, unix))]
mod test_support;

pub use error::{ErrorKind, Result, ScError};
