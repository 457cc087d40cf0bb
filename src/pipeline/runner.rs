//! [`SoundChangeOrchestrator`] — drives rule-set lookup, staging, engine
//! invocation and output collection for a list of requests.
//!
//! # Flow per request
//!
//! ```text
//! acquire permit ─▶ StagingArea::create ─▶ stage_rules ─▶ stage_input
//!   ─▶ engine.invoke ─▶ collect_output ─▶ line-count check ─▶ close area
//!         │
//!         └─ Engine / Io error ─▶ retry with a fresh area (bounded)
//! ```
//!
//! Requests of one call run strictly in order.  Separate calls may run
//! concurrently: every attempt has its own staging directory, and the number
//! of live engine processes is capped by a semaphore.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, OrchestratorConfig, StagingConfig};
use crate::engine::{EngineError, LexurgyEngine, SoundChangeEngine};
use crate::error::{Result, ScError};
use crate::pipeline::request::{ApplicationRequest, ApplicationResult};
use crate::rules::{RuleSet, RuleStore};
use crate::staging::StagingArea;

// ---------------------------------------------------------------------------
// SoundChangeOrchestrator
// ---------------------------------------------------------------------------

/// Applies stored rule-sets to word lists through a [`SoundChangeEngine`].
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct SoundChangeOrchestrator {
    store: Arc<dyn RuleStore>,
    engine: Arc<dyn SoundChangeEngine>,
    staging: StagingConfig,
    config: OrchestratorConfig,
    permits: Semaphore,
}

impl SoundChangeOrchestrator {
    /// Create an orchestrator from explicit parts.
    ///
    /// # Arguments
    ///
    /// * `store`   — rule-set lookup.
    /// * `engine`  — engine runner (e.g. [`LexurgyEngine`]).
    /// * `staging` — where per-run directories are created.
    /// * `config`  — retry, line-count and concurrency settings.
    pub fn new(
        store: Arc<dyn RuleStore>,
        engine: Arc<dyn SoundChangeEngine>,
        staging: StagingConfig,
        config: OrchestratorConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent_runs.max(1));
        Self {
            store,
            engine,
            staging,
            config,
            permits,
        }
    }

    /// Create an orchestrator backed by a [`LexurgyEngine`] built from
    /// `config.engine`.
    pub fn from_config(store: Arc<dyn RuleStore>, config: &AppConfig) -> Self {
        let engine = Arc::new(LexurgyEngine::from_config(&config.engine));
        Self::new(
            store,
            engine,
            config.staging.clone(),
            config.orchestrator.clone(),
        )
    }

    /// Apply every request in order and concatenate the outputs.
    pub async fn apply(&self, requests: &[ApplicationRequest]) -> Result<ApplicationResult> {
        self.apply_with_cancel(requests, &CancellationToken::new())
            .await
    }

    /// Like [`apply`](Self::apply), after checking that `user_id` owns every
    /// referenced rule-set.
    pub async fn apply_for_user(
        &self,
        user_id: &str,
        requests: &[ApplicationRequest],
        cancel: &CancellationToken,
    ) -> Result<ApplicationResult> {
        let ids: Vec<u64> = requests.iter().map(|r| r.rule_set_id).collect();
        self.store.verify_ownership(user_id, &ids)?;
        self.apply_with_cancel(requests, cancel).await
    }

    /// Apply every request in order; firing `cancel` kills the running
    /// engine process and returns [`ScError::Cancelled`].
    ///
    /// All rule-sets are resolved before the first engine run, so an unknown
    /// id fails the call without starting any process.
    pub async fn apply_with_cancel(
        &self,
        requests: &[ApplicationRequest],
        cancel: &CancellationToken,
    ) -> Result<ApplicationResult> {
        let rule_sets = requests
            .iter()
            .map(|r| self.store.get(r.rule_set_id))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total: usize = requests.iter().map(|r| r.word_list.len()).sum();
        let mut output = Vec::with_capacity(total);

        for (request, rule_set) in requests.iter().zip(&rule_sets) {
            log::info!(
                "sc: applying rule-set {} to {} word(s)",
                rule_set.id,
                request.word_list.len()
            );
            let words = self
                .run_with_retry(&request.word_list, rule_set, cancel)
                .await?;
            output.extend(words);
        }

        Ok(ApplicationResult { output })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn run_with_retry(
        &self,
        words: &[String],
        rule_set: &RuleSet,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.run_once(words, rule_set, cancel).await {
                Ok(out) => return Ok(out),
                Err(e) if e.is_retryable() && attempt < attempts && !cancel.is_cancelled() => {
                    log::warn!(
                        "sc: rule-set {} attempt {attempt}/{attempts} failed, retrying: {e}",
                        rule_set.id
                    );
                    attempt += 1;
                }
                Err(e) => {
                    log::error!("sc: rule-set {} failed: {e}", rule_set.id);
                    return Err(e);
                }
            }
        }
    }

    async fn run_once(
        &self,
        words: &[String],
        rule_set: &RuleSet,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let _permit = tokio::select! {
            permit = self.permits.acquire() => {
                permit.map_err(|_| ScError::Internal("engine run semaphore closed".into()))?
            }
            _ = cancel.cancelled() => return Err(ScError::Cancelled),
        };

        // Dropped (and deleted) on every early return below.
        let area = StagingArea::create(&self.staging)?;
        area.stage_rules(&rule_set.content).await?;
        area.stage_input(words).await?;

        self.engine.invoke(&area, cancel).await?;

        let mut output = area.collect_output().await?;
        restore_trailing_empty(words, &mut output);
        if self.config.verify_line_count && output.len() != words.len() {
            return Err(EngineError::LineCountMismatch {
                expected: words.len(),
                actual: output.len(),
            }
            .into());
        }

        if let Err(e) = area.close() {
            log::warn!("sc: failed to remove staging area: {e}");
        }
        Ok(output)
    }
}

/// Trailing empty words do not survive the newline-joined input file, so
/// the engine never echoes them back.  Re-append them when exactly those
/// are missing from `output`.
fn restore_trailing_empty(words: &[String], output: &mut Vec<String>) {
    let trailing = words.iter().rev().take_while(|w| w.is_empty()).count();
    if output.len() < words.len() && output.len() + trailing >= words.len() {
        output.resize(words.len(), String::new());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
