//! Error taxonomy for the locking protocol

use std::io;
use std::path::PathBuf;

use crate::signature::{display_opt, Signature};

/// Failure reported by a stage's external work.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    /// The work ran and failed (non-zero exit, tool crash, I/O error).
    #[error("{0:#}")]
    Failed(anyhow::Error),
    /// The caller interrupted the work before it finished.
    #[error("interrupted")]
    Cancelled,
}

impl From<anyhow::Error> for WorkError {
    fn from(e: anyhow::Error) -> Self {
        Self::Failed(e)
    }
}

/// Errors surfaced by lock managers, the lock store and the pipeline runner.
///
/// Verification failures (`NotCached`, `Unlocked`, `StaleDependency`,
/// `CorruptCache`) are raised before anything on disk is touched.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("{stage}: dependency '{dependency}' has no cached result; run '{dependency}' first")]
    NotCached { stage: String, dependency: String },

    #[error("{stage}: no cached result; run '{stage}' first")]
    Unlocked { stage: String },

    #[error(
        "{stage}: dependency '{dependency}' changed since last run (recorded {}, now {}); \
         re-run '{dependency}', or force a rebuild of '{stage}'",
        display_opt(.recorded),
        display_opt(.current)
    )]
    StaleDependency {
        stage: String,
        dependency: String,
        recorded: Option<Signature>,
        current: Option<Signature>,
    },

    #[error(
        "{stage}: cached artifacts do not match the lock record (recorded {}, now {}); \
         artifacts were modified outside the pipeline, force a rebuild of '{stage}'",
        display_opt(.recorded),
        display_opt(.current)
    )]
    CorruptCache {
        stage: String,
        recorded: Option<Signature>,
        current: Option<Signature>,
    },

    #[error("{context}: {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed lock record {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{stage}: stage work failed")]
    WorkExecution {
        stage: String,
        #[source]
        source: WorkError,
    },

    #[error("{stage}: stage work failed ({work}) and the previous lock record could not be restored")]
    RollbackFailed {
        stage: String,
        work: WorkError,
        #[source]
        source: Box<LockError>,
    },

    #[error("{stage}: interrupted; lock record left invalidated, the next run will rebuild")]
    Cancelled { stage: String },
}

impl LockError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a verification abort (nothing was mutated).
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::NotCached { .. }
                | Self::Unlocked { .. }
                | Self::StaleDependency { .. }
                | Self::CorruptCache { .. }
        )
    }
}
