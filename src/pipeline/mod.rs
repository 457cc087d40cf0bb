//! Sound-change orchestration: rule-set lookup → staging → engine → output.
//!
//! # Architecture
//!
//! ```text
//! apply([ApplicationRequest])
//!        │
//!        ├─ RuleStore::get(id) for every request   → NotFound before any run
//!        │
//!        └─ for each request, in order
//!              ├─ acquire run permit (Semaphore)
//!              ├─ StagingArea::create               fresh dir per attempt
//!              ├─ stage_rules / stage_input
//!              ├─ SoundChangeEngine::invoke         marker | timeout | cancel
//!              ├─ collect_output (+ line-count check)
//!              └─ retry once on Engine / Io errors
//!
//! ApplicationResult { output }  ← concatenated in request order
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conlang_sc::config::AppConfig;
//! use conlang_sc::pipeline::{ApplicationRequest, SoundChangeOrchestrator};
//! use conlang_sc::rules::JsonRuleStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let store = Arc::new(JsonRuleStore::open(config.store.resolved_path()).unwrap());
//!     let orchestrator = SoundChangeOrchestrator::from_config(store, &config);
//!
//!     let result = orchestrator
//!         .apply(&[ApplicationRequest::new(1, ["test"])])
//!         .await
//!         .unwrap();
//!     println!("{:?}", result.output);
//! }
//! ```

pub mod request;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use request::{ApplicationRequest, ApplicationResult};
pub use runner::SoundChangeOrchestrator;
