//! Completion protocol: wait for the marker line on the engine's stdout.
//!
//! [`ReadyWatch::wait`] consumes a line stream lazily and resolves with the
//! first of:
//!
//! * [`WatchOutcome::Ready`]     — a line contains the completion marker
//! * [`WatchOutcome::Eof`]       — the stream closed (process exited)
//! * [`WatchOutcome::TimedOut`]  — the deadline elapsed
//! * [`WatchOutcome::Cancelled`] — the cancellation token fired

use std::time::Duration;

use tokio::io::{AsyncBufRead, Lines};
use tokio_util::sync::CancellationToken;

/// How a [`ReadyWatch::wait`] call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The marker line, as read.
    Ready(String),
    Eof,
    TimedOut,
    Cancelled,
}

/// Scans engine output for a completion marker under a deadline.
#[derive(Debug, Clone)]
pub struct ReadyWatch {
    marker: String,
    deadline: Duration,
}

impl ReadyWatch {
    pub fn new(marker: impl Into<String>, deadline: Duration) -> Self {
        Self {
            marker: marker.into(),
            deadline,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// `true` when `line` signals completion.
    pub fn is_ready(&self, line: &str) -> bool {
        line.contains(&self.marker)
    }

    /// Read `lines` until the marker, EOF, the deadline or cancellation.
    ///
    /// Lines before the marker are logged at debug level.  I/O errors on the
    /// stream (including invalid UTF-8) are returned as-is.
    pub async fn wait<R>(
        &self,
        lines: &mut Lines<R>,
        cancel: &CancellationToken,
    ) -> std::io::Result<WatchOutcome>
    where
        R: AsyncBufRead + Unpin,
    {
        let scan = async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        log::debug!("engine: {line}");
                        if self.is_ready(&line) {
                            return Ok(WatchOutcome::Ready(line));
                        }
                    }
                    Ok(None) => return Ok(WatchOutcome::Eof),
                    Err(e) => return Err(e),
                }
            }
        };

        tokio::select! {
            res = tokio::time::timeout(self.deadline, scan) => match res {
                Ok(outcome) => outcome,
                Err(_elapsed) => Ok(WatchOutcome::TimedOut),
            },
            _ = cancel.cancelled() => Ok(WatchOutcome::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
