//! Crate-level error taxonomy for the apply workflow.
//!
//! Component errors ([`StoreError`], [`StagingError`], [`EngineError`]) are
//! folded into [`ScError`], whose [`kind`](ScError::kind) decides how the
//! caller reacts:
//!
//! | Kind           | Client-facing | Retried internally |
//! |----------------|---------------|--------------------|
//! | `NotFound`     | yes           | no                 |
//! | `Unauthorized` | yes           | no                 |
//! | `InvalidInput` | yes           | no                 |
//! | `Engine`       | no            | once (configurable)|
//! | `Io`           | no            | once (configurable)|
//! | `Cancelled`    | no            | no                 |
//! | `Internal`     | no            | no                 |
//!
//! A line-count mismatch is an `Engine` error but is never retried: the
//! engine is deterministic, so a second run returns the same output.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::rules::StoreError;
use crate::staging::StagingError;

pub type Result<T> = std::result::Result<T, ScError>;

#[derive(Debug, Error)]
pub enum ScError {
    #[error("rule-set {0} not found")]
    RuleSetNotFound(u64),

    #[error("language {0} not found")]
    LanguageNotFound(u64),

    /// The engine reported completion but left no output file.
    #[error("engine output {0} does not exist")]
    OutputMissing(PathBuf),

    #[error("user {user_id} does not own rule-set(s) {rule_set_ids:?}")]
    Unauthorized {
        user_id: String,
        rule_set_ids: Vec<u64>,
    },

    /// A caller-supplied id the store cannot accept.
    #[error("id {0} is out of range")]
    InvalidId(u64),

    #[error(transparent)]
    Engine(EngineError),

    /// Staging filesystem failure.
    #[error("staging I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sound-change run cancelled")]
    Cancelled,

    /// Rule store persistence failure (unreadable / corrupt file, poisoned
    /// lock).
    #[error(transparent)]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse category of an [`ScError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidInput,
    Engine,
    Io,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Engine => "engine",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScError::RuleSetNotFound(_)
            | ScError::LanguageNotFound(_)
            | ScError::OutputMissing(_) => ErrorKind::NotFound,
            ScError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ScError::InvalidId(_) => ErrorKind::InvalidInput,
            ScError::Engine(_) => ErrorKind::Engine,
            ScError::Io { .. } => ErrorKind::Io,
            ScError::Cancelled => ErrorKind::Cancelled,
            ScError::Store(_) | ScError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Engine and staging I/O failures may be transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScError::Engine(EngineError::LineCountMismatch { .. }) => false,
            _ => matches!(self.kind(), ErrorKind::Engine | ErrorKind::Io),
        }
    }

    /// Errors caused by the request itself rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Unauthorized | ErrorKind::InvalidInput
        )
    }
}

impl From<StoreError> for ScError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RuleSetNotFound(id) => ScError::RuleSetNotFound(id),
            StoreError::LanguageNotFound(id) => ScError::LanguageNotFound(id),
            StoreError::InvalidId(id) => ScError::InvalidId(id),
            StoreError::Unauthorized {
                user_id,
                rule_set_ids,
            } => ScError::Unauthorized {
                user_id,
                rule_set_ids,
            },
            other => ScError::Store(other),
        }
    }
}

impl From<StagingError> for ScError {
    fn from(e: StagingError) -> Self {
        match e {
            StagingError::Io { path, source } => ScError::Io { path, source },
            StagingError::OutputMissing(path) => ScError::OutputMissing(path),
        }
    }
}

impl From<EngineError> for ScError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => ScError::Cancelled,
            other => ScError::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let e: ScError = StoreError::RuleSetNotFound(4).into();
        assert_eq!(e.kind(), ErrorKind::NotFound);
        assert!(e.is_client_error());
        assert!(!e.is_retryable());
    }

    #[test]
    fn store_unauthorized_stays_unauthorized() {
        let e: ScError = StoreError::Unauthorized {
            user_id: "mallory".into(),
            rule_set_ids: vec![1],
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Unauthorized);
        assert!(e.is_client_error());
    }

    #[test]
    fn store_poisoned_is_internal() {
        let e: ScError = StoreError::Poisoned.into();
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert!(!e.is_retryable());
    }

    #[test]
    fn engine_errors_are_retryable_except_cancel() {
        let timeout: ScError = EngineError::Timeout(Duration::from_secs(1)).into();
        assert!(timeout.is_retryable());
        assert!(!timeout.is_client_error());

        let cancelled: ScError = EngineError::Cancelled.into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
        assert!(!cancelled.is_retryable());
    }

    #[test]
    fn line_count_mismatch_is_not_retried() {
        let e: ScError = EngineError::LineCountMismatch {
            expected: 2,
            actual: 1,
        }
        .into();
        assert_eq!(e.kind(), ErrorKind::Engine);
        assert!(!e.is_retryable());
    }

    #[test]
    fn invalid_id_is_client_error() {
        let e: ScError = StoreError::InvalidId(u64::MAX).into();
        assert_eq!(e.kind(), ErrorKind::InvalidInput);
        assert!(e.is_client_error());
        assert!(!e.is_retryable());
    }

    #[test]
    fn staging_errors_map_by_variant() {
        let io: ScError = StagingError::Io {
            path: PathBuf::from("/tmp/sc-x/input.wli"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert_eq!(io.kind(), ErrorKind::Io);
        assert!(io.is_retryable());

        let missing: ScError = StagingError::OutputMissing(PathBuf::from("input_ev.wli")).into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(!missing.is_retryable());
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ErrorKind::NotFound.to_string(), "not_found");
        assert_eq!(ErrorKind::Engine.as_str(), "engine");
    }
}
