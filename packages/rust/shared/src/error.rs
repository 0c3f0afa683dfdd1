//! Error types for Corpscope.
//!
//! Library crates use [`CorpscopeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The pipeline taxonomy is split by blast radius:
//! - [`FetchError`]: source unreachable or malformed, always fatal
//! - [`StageError`]: a stage could not produce its fields, fatal only when
//!   the company identity is missing or the source could not be fetched
//! - [`AssetCheckError`]: a single domain check failed, always recoverable
//! - [`StoreError`]: persistence failed, computed scores remain valid
//! - [`AnalysisError`]: the optional LLM layer failed, never affects scoring

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::Stage;

/// Top-level error type for all Corpscope operations.
#[derive(Debug, thiserror::Error)]
pub enum CorpscopeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Source document could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A pipeline stage failed fatally.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// Persisting a run failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// LLM analysis failed.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Network/HTTP client construction error.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (empty company name, bad report path, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CorpscopeError>;

impl CorpscopeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// FetchError
// ---------------------------------------------------------------------------

/// Failure to obtain the source document for a company.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// No article matched the company name.
    #[error("no source article found for '{name}'")]
    NotFound { name: String },

    /// Transport failure or non-success HTTP status.
    #[error("source unreachable: {message}")]
    Unreachable { message: String },

    /// The response arrived but could not be interpreted.
    #[error("malformed source document: {message}")]
    Malformed { message: String },
}

impl FetchError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable {
            message: msg.into(),
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed {
            message: msg.into(),
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

// ---------------------------------------------------------------------------
// AssetCheckError
// ---------------------------------------------------------------------------

/// Failure of a single domain lookup or reachability check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("asset check for {domain} failed: {reason}")]
pub struct AssetCheckError {
    pub domain: String,
    pub reason: AssetCheckFailure,
}

/// Why an asset check failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AssetCheckFailure {
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("network error: {0}")]
    Network(String),
    #[error("lookup error: {0}")]
    Lookup(String),
}

impl AssetCheckError {
    pub fn timeout(domain: impl Into<String>, after_ms: u64) -> Self {
        Self {
            domain: domain.into(),
            reason: AssetCheckFailure::Timeout(after_ms),
        }
    }

    pub fn network(domain: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            reason: AssetCheckFailure::Network(msg.into()),
        }
    }

    pub fn lookup(domain: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            reason: AssetCheckFailure::Lookup(msg.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// StageError
// ---------------------------------------------------------------------------

/// A pipeline stage could not produce (all of) its fields.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("stage {stage} failed: {cause}")]
pub struct StageError {
    pub stage: Stage,
    pub cause: StageCause,
}

/// Underlying cause of a [`StageError`].
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageCause {
    /// The record has no usable legal name.
    #[error("company identity is missing a legal name")]
    MissingIdentity,

    /// The source document could not be fetched.
    #[error("{0}")]
    Fetch(FetchError),

    /// A single domain lookup or check failed.
    #[error("{0}")]
    AssetCheck(AssetCheckError),

    /// Some assets could not be verified and were marked inactive.
    #[error("{degraded} of {total} assets degraded to inactive")]
    Degraded { degraded: usize, total: usize },
}

impl StageError {
    pub fn new(stage: Stage, cause: StageCause) -> Self {
        Self { stage, cause }
    }

    /// Fatal errors stop the run; everything else is accumulated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.cause,
            StageCause::MissingIdentity | StageCause::Fetch(_)
        )
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    #[error("database is opened in read-only mode")]
    ReadOnly,

    #[error("query failed: {0}")]
    Query(String),

    #[error("stored data is invalid: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same write could succeed. A read-only handle or a
    /// failed migration stays that way.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::ReadOnly | Self::Migration { .. })
    }
}

// ---------------------------------------------------------------------------
// AnalysisError
// ---------------------------------------------------------------------------

/// Failure of the optional LLM analysis layer.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis provider is not configured: {0}")]
    NotConfigured(String),

    #[error("analysis request failed: {0}")]
    Request(String),

    #[error("analysis provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analysis response could not be read: {0}")]
    Response(String),
}

impl AnalysisError {
    /// Transport failures, rate limiting and server errors are worth another
    /// attempt; bad keys and malformed requests are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured(_) | Self::Response(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CorpscopeError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CorpscopeError::validation("company name is empty");
        assert!(err.to_string().contains("company name"));
    }

    #[test]
    fn fatality_follows_cause() {
        let fatal = StageError::new(Stage::DataEntry, StageCause::MissingIdentity);
        assert!(fatal.is_fatal());

        let fetch = StageError::new(
            Stage::Collection,
            StageCause::Fetch(FetchError::NotFound {
                name: "Nope".into(),
            }),
        );
        assert!(fetch.is_fatal());

        let check = StageError::new(
            Stage::AssetVerification,
            StageCause::AssetCheck(AssetCheckError::timeout("example.com", 5000)),
        );
        assert!(!check.is_fatal());
        assert_eq!(
            check.to_string(),
            "stage asset_verification failed: asset check for example.com failed: timed out after 5000 ms"
        );
    }

    #[test]
    fn only_unreachable_fetches_are_transient() {
        assert!(FetchError::unreachable("connection reset").is_transient());
        assert!(!FetchError::malformed("no title").is_transient());
    }

    #[test]
    fn analysis_retries_only_transient_failures() {
        let status = |status| AnalysisError::Status {
            status,
            body: String::new(),
        };
        assert!(AnalysisError::Request("connection reset".into()).is_transient());
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(400).is_transient());
        assert!(!AnalysisError::NotConfigured("gemini".into()).is_transient());
    }

    #[test]
    fn read_only_store_is_permanent() {
        assert!(StoreError::Query("database is locked".into()).is_transient());
        assert!(!StoreError::ReadOnly.is_transient());
        assert!(
            !StoreError::Migration {
                version: 2,
                message: "syntax error".into()
            }
            .is_transient()
        );
    }
}
