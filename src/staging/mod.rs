//! Transcript staging: the per-run directory the engine reads from and
//! writes into.
//!
//! Every engine run gets its own uniquely named directory, so concurrent
//! runs never see each other's `input.wli` / `sc.lsc` / `input_ev.wli`.
//! The directory is removed when the [`StagingArea`] is dropped, on success
//! and on every error path alike.
//!
//! ```text
//! <root>/sc-XXXXXX/
//!   ├─ sc.lsc         ← stage_rules(content)
//!   ├─ input.wli      ← stage_input(words)
//!   └─ input_ev.wli   → collect_output()   (written by the engine)
//! ```

pub mod area;

pub use area::{derived_output_name, StagingArea, StagingError};
