//! labbook-lock: dependency-signature locking for staged experiments
//!
//! Each pipeline stage (corpus → sample → config → experiment) owns a
//! directory of artifacts and a `LOCKFILE` recording the blake3 signatures
//! it was built against. Before a stage runs, the recorded signatures are
//! compared with its dependencies' live ones to decide whether the cached
//! artifacts are still valid, and the lock file is handled so that a failed
//! or interrupted run never leaves a falsely valid cache behind.

pub mod error;
pub mod experiment;
pub mod hash;
pub mod manager;
pub mod record;
pub mod runner;
pub mod signature;
pub mod stage;
pub mod store;

pub use error::{LockError, WorkError};
pub use experiment::ExperimentConfig;
pub use manager::{ConfigLock, CorpusLock, ExperimentLock, LockManager, SampleLock};
pub use record::{LockRecord, LOCKFILE};
pub use runner::{CacheStatus, PipelineRunner, RunOptions, RunOutcome, StageWork};
pub use signature::Signature;
pub use stage::StageKind;
pub use store::LockStore;
