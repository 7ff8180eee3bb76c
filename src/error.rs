//! Error taxonomy for the search engine
//!
//! Failures are classified so the orchestrator can isolate them: a malformed
//! query graph aborts the whole request, while per-cluster and per-result
//! failures (solver timeouts, unknown result kinds, missing bins) only drop
//! the cluster or result they belong to.

use std::path::PathBuf;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// All failure classes surfaced by the engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or truncated binary input (graph or search-result message)
    #[error("decode error: {context}")]
    Decode {
        /// What was being decoded when the input ran out or mismatched
        context: String,
    },

    /// The solver reported a result kind the interpreter does not recognize
    #[error("unknown result kind tag {0}")]
    UnknownResultKind(u8),

    /// The external solver exceeded its wall-clock budget and was killed
    #[error("solver timed out after {timeout_secs}s on {lattice:?}")]
    SolverTimeout {
        /// Configured timeout in seconds
        timeout_secs: u64,
        /// Lattice file the solver was working on
        lattice: PathBuf,
    },

    /// The external solver exited with a nonzero status
    #[error("solver failed with status {status:?}: {stderr}")]
    SolverFailure {
        /// Exit code, if the process was not killed by a signal
        status: Option<i32>,
        /// Captured standard error (may be empty)
        stderr: String,
    },

    /// A requested bin or node id is absent from the decoded lattice
    #[error("missing mapping: {0}")]
    MissingMapping(String),

    /// Underlying I/O failure (file reads, subprocess spawning)
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::Decode`] with a formatted context
    pub(crate) fn decode(context: impl Into<String>) -> Self {
        Error::Decode {
            context: context.into(),
        }
    }
}
