//! External sound-change engine invocation.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │               SoundChangeEngine (trait)                   │
//! │                                                           │
//! │   ┌──────────────┐   spawn  ┌───────────────────────────┐ │
//! │   │ LexurgyEngine│─────────▶│ <binary> sc sc.lsc in.wli │ │
//! │   │ - binary     │          │   cwd = StagingArea       │ │
//! │   │ - timeout    │          └────────────┬──────────────┘ │
//! │   └──────────────┘                stdout │ (lines)        │
//! │                                          ▼                │
//! │                        ┌──────────────────────────────┐   │
//! │                        │ ReadyWatch                   │   │
//! │                        │ Ready | Eof | TimedOut |     │   │
//! │                        │ Cancelled                    │   │
//! │                        └──────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine does not exit on its own once it is done; it prints a line
//! containing the completion marker after the output file has been flushed.
//! [`ReadyWatch`] turns that line into an explicit ready event, and
//! [`LexurgyEngine`] kills and reaps the process on every outcome.

pub mod process;
pub mod watch;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use process::{EngineError, LexurgyEngine, SoundChangeEngine};
pub use watch::{ReadyWatch, WatchOutcome};

#[cfg(test)]
pub use process::MockEngine;
