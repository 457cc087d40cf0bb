//! Engine trait and the subprocess-backed [`LexurgyEngine`].
//!
//! [`SoundChangeEngine`] is the seam the orchestrator depends on.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn SoundChangeEngine>`.
//!
//! [`MockEngine`] (available under `#[cfg(test)]`) writes a transformed copy
//! of the staged input without spawning anything.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::watch::{ReadyWatch, WatchOutcome};
use crate::staging::StagingArea;

/// How long to wait for a process that closed stdout to actually exit, and
/// for the stderr drain to finish after the process is gone.
const REAP_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors raised while running the external engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be started (missing, not executable …).
    #[error("failed to start engine {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited (or closed stdout) without printing the marker.
    #[error("engine exited with {status} before reporting completion; stderr: {}", stderr_summary(.stderr))]
    ExitedWithoutMarker {
        status: ExitStatus,
        stderr: Vec<String>,
    },

    /// The marker did not appear within the configured deadline.
    #[error("engine did not report completion within {0:?}")]
    Timeout(Duration),

    #[error("engine run cancelled")]
    Cancelled,

    /// Reading the engine's stdout failed.
    #[error("engine stdout: {0}")]
    Io(#[source] std::io::Error),

    /// The output file does not have one line per input word.
    #[error("engine returned {actual} line(s) for {expected} input word(s)")]
    LineCountMismatch { expected: usize, actual: usize },
}

fn stderr_summary(lines: &[String]) -> String {
    if lines.is_empty() {
        "<empty>".into()
    } else {
        lines.join(" | ")
    }
}

// ---------------------------------------------------------------------------
// SoundChangeEngine trait
// ---------------------------------------------------------------------------

/// Runs a sound-change engine against a prepared [`StagingArea`].
///
/// # Contract
///
/// - The rules and input files have already been staged.
/// - On `Ok(())` the area's output file is complete.
/// - No process started by the call survives it, whatever the outcome.
#[async_trait]
pub trait SoundChangeEngine: Send + Sync {
    async fn invoke(
        &self,
        area: &StagingArea,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError>;
}

// Compile-time assertion: Box<dyn SoundChangeEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SoundChangeEngine>) {}
};

// ---------------------------------------------------------------------------
// LexurgyEngine
// ---------------------------------------------------------------------------

/// Production engine: spawns `<binary> sc <rules> <input>` inside the
/// staging directory and waits for the completion marker.
#[derive(Debug, Clone)]
pub struct LexurgyEngine {
    binary: PathBuf,
    watch: ReadyWatch,
    stderr_tail_lines: usize,
}

impl LexurgyEngine {
    /// Build from config.  A relative binary path containing a directory
    /// component is resolved against the current directory, because the
    /// child runs with the staging area as its working directory.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            binary: resolve_binary(&config.binary),
            watch: ReadyWatch::new(config.completion_marker.clone(), config.timeout()),
            stderr_tail_lines: config.stderr_tail_lines,
        }
    }

    /// Override the completion deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.watch = self.watch.with_deadline(timeout);
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, area: &StagingArea) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("sc")
            .arg(area.rules_file())
            .arg(area.input_file())
            .current_dir(area.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn resolve_binary(binary: &Path) -> PathBuf {
    if binary.is_absolute() || binary.components().count() < 2 {
        return binary.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(binary),
        Err(e) => {
            log::warn!("engine: cannot resolve {}: {e}", binary.display());
            binary.to_path_buf()
        }
    }
}

#[async_trait]
impl SoundChangeEngine for LexurgyEngine {
    async fn invoke(
        &self,
        area: &StagingArea,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut child = self
            .command(area)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        log::debug!(
            "engine: spawned {} (pid {:?}) in {}, waiting for {:?}",
            self.binary.display(),
            child.id(),
            area.path().display(),
            self.watch.marker()
        );

        let stderr = child
            .stderr
            .take()
            .map(|s| tokio::spawn(drain_stderr(s, self.stderr_tail_lines)));

        let outcome = match child.stdout.take() {
            Some(stdout) => {
                let mut lines = BufReader::new(stdout).lines();
                self.watch.wait(&mut lines, cancel).await
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "engine stdout was not captured",
            )),
        };

        match outcome {
            Ok(WatchOutcome::Ready(_)) => {
                // Output file is complete; the engine would otherwise linger.
                if let Err(e) = terminate(&mut child).await {
                    log::warn!("engine: failed to reap after completion: {e}");
                }
                if let Some(handle) = stderr {
                    handle.abort();
                }
                log::debug!("engine: completion marker seen");
                Ok(())
            }
            Ok(WatchOutcome::Eof) => {
                let reaped = tokio::time::timeout(REAP_GRACE, child.wait()).await;
                let status = match reaped {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => return Err(EngineError::Io(e)),
                    Err(_) => terminate(&mut child).await.map_err(EngineError::Io)?,
                };
                let stderr = collect_tail(stderr).await;
                log::warn!("engine: exited with {status} without completion marker");
                Err(EngineError::ExitedWithoutMarker { status, stderr })
            }
            Ok(WatchOutcome::TimedOut) => {
                if let Err(e) = terminate(&mut child).await {
                    log::warn!("engine: failed to reap after timeout: {e}");
                }
                let tail = collect_tail(stderr).await;
                log::warn!(
                    "engine: no completion marker after {:?}; stderr: {}",
                    self.watch.deadline(),
                    stderr_summary(&tail)
                );
                Err(EngineError::Timeout(self.watch.deadline()))
            }
            Ok(WatchOutcome::Cancelled) => {
                if let Err(e) = terminate(&mut child).await {
                    log::warn!("engine: failed to reap after cancellation: {e}");
                }
                if let Some(handle) = stderr {
                    handle.abort();
                }
                log::info!("engine: run cancelled, process killed");
                Err(EngineError::Cancelled)
            }
            Err(e) => {
                if let Err(reap) = terminate(&mut child).await {
                    log::warn!("engine: failed to reap after stdout error: {reap}");
                }
                if let Some(handle) = stderr {
                    handle.abort();
                }
                Err(EngineError::Io(e))
            }
        }
    }
}

/// Kill the child (if still running) and reap it.
async fn terminate(child: &mut Child) -> std::io::Result<ExitStatus> {
    if let Err(e) = child.start_kill() {
        log::debug!("engine: kill failed (already exited?): {e}");
    }
    let status = child.wait().await?;
    log::debug!("engine: reaped, {status}");
    Ok(status)
}

/// Log every stderr line and keep the last `keep` of them.
async fn drain_stderr<R>(stderr: R, keep: usize) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(keep);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!("engine stderr: {line}");
        if keep == 0 {
            continue;
        }
        if tail.len() == keep {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

async fn collect_tail(handle: Option<JoinHandle<Vec<String>>>) -> Vec<String> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(REAP_GRACE, &mut handle).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            log::debug!("engine: stderr drain task failed: {e}");
            Vec::new()
        }
        Err(_) => {
            // A grandchild still holds stderr open.
            handle.abort();
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// MockEngine  (test-only)
// ---------------------------------------------------------------------------

/// A test double that writes `transform(word)` for every staged input line,
/// optionally failing the first `failures` calls.
#[cfg(test)]
pub struct MockEngine {
    transform: Box<dyn Fn(&str, &str) -> Vec<String> + Send + Sync>,
    write_output: bool,
    failures: std::sync::atomic::AtomicUsize,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockEngine {
    /// Replace every occurrence of `from` with `to` where the staged rules
    /// read `"<from> => <to>"`.
    pub fn substituting() -> Self {
        Self::with(|rules, input| {
            let (from, to) = rules.split_once("=>").unwrap_or((rules, rules));
            let (from, to) = (from.trim(), to.trim());
            input.lines().map(|w| w.replace(from, to)).collect()
        })
    }

    /// Use an arbitrary `(rules, input) -> output lines` function.
    pub fn with(f: impl Fn(&str, &str) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            transform: Box::new(f),
            write_output: true,
            failures: std::sync::atomic::AtomicUsize::new(0),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Fail the first `n` calls with a timeout.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures.store(n, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Report success without writing the output file.
    pub fn without_output(mut self) -> Self {
        self.write_output = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl SoundChangeEngine for MockEngine {
    async fn invoke(
        &self,
        area: &StagingArea,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        use std::sync::atomic::Ordering;

        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::Timeout(Duration::from_millis(1)));
        }

        if !self.write_output {
            return Ok(());
        }
        let rules = std::fs::read_to_string(area.rules_path()).map_err(EngineError::Io)?;
        let input = std::fs::read_to_string(area.input_path()).map_err(EngineError::Io)?;
        let output = (self.transform)(&rules, &input);
        std::fs::write(area.output_path(), output.join("\n")).map_err(EngineError::Io)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
