//! Error types for the mergeorder core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type.
//!
//! Only infrastructure failures are fatal to a run: [`VcsError`],
//! [`ConfigError`] and [`SearchError`]. [`ExtractError`] and
//! [`AdvisoryError`] are always recovered locally by degrading the signal or
//! the advisory score.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Advisory(#[from] AdvisoryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

// ---------------------------------------------------------------------------
// VCS errors
// ---------------------------------------------------------------------------

/// Errors from the version-control gateway.
#[derive(Debug, Error)]
pub enum VcsError {
    /// The `git` binary was not found on `$PATH`.
    #[error("vcs binary not found: {0}")]
    BinaryNotFound(String),

    /// A gateway command exited with an unexpected non-zero status.
    #[error("vcs command `{command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A gateway command did not finish within its time bound.
    #[error("vcs command `{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    /// The working tree has uncommitted changes.
    #[error(
        "working tree is not clean ({} uncommitted entries); commit or stash first",
        entries.len()
    )]
    DirtyWorkingTree { entries: Vec<String> },

    /// A branch or revision could not be resolved.
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// The disposable simulation branch name is already taken.
    #[error("simulation branch '{0}' already exists")]
    BranchExists(String),

    /// Generic I/O wrapper.
    #[error("vcs I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Extraction errors
// ---------------------------------------------------------------------------

/// Errors from the strict merge-comparison parser.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The comparison text does not have the structure the parser expects.
    #[error("malformed comparison text: {0}")]
    MalformedComparisonText(String),
}

// ---------------------------------------------------------------------------
// Advisory errors
// ---------------------------------------------------------------------------

/// Failure classes of the advisory oracle.
#[derive(Debug, Error)]
pub enum AdvisoryError {
    /// No credential was configured for the oracle.
    #[error("no credential configured (set ${env_var})")]
    MissingCredential { env_var: String },

    /// The request could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// The oracle did not answer in time.
    #[error("no answer within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The oracle answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The answer was not a JSON verdict with the expected schema.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AdvisoryError {
    /// Short, stable label of the failure class for rationale strings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCredential { .. } => "missing_credential",
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::HttpStatus { .. } => "http_status",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is nonsensical (bad weights, zero thresholds, ...).
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidConfiguration { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, detail: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Search errors
// ---------------------------------------------------------------------------

/// Errors from the order search strategies.
#[derive(Debug, Error)]
pub enum SearchError {
    /// No branches were given.
    #[error("no branches given")]
    NoBranches,

    /// The same branch was given more than once.
    #[error("branch '{0}' given more than once")]
    DuplicateBranch(String),

    /// The branch set is too large for exhaustive simulation.
    #[error(
        "{count} branches means {count}! merge orders; exhaustive search is capped at {limit} \
         (use the independent strategy or force the run)"
    )]
    TooManyBranches { count: usize, limit: usize },

    /// Underlying VCS failure.
    #[error("search aborted: {0}")]
    Vcs(#[from] VcsError),
}
