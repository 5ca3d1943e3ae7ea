//! Crash-safe stage execution: verify → invalidate → execute → commit/rollback
//!
//! ```text
//! CHECKING ──► VALID_CACHE ──► DONE
//!     │
//!     ├──► STALE ──────────► abort (record untouched)
//!     │
//!     └──► NOT_CACHED ──► INVALIDATED ──► RUNNING ──► COMMITTED
//!                                            └──────► ROLLED_BACK
//! ```
//!
//! The lock record is deleted (durably) before any work starts, so a crash
//! or interrupt during RUNNING leaves the stage uncached rather than falsely
//! valid.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::error::{LockError, WorkError};
use crate::manager::LockManager;
use crate::record::{DependencyMismatch, LockRecord};
use crate::signature::{display_opt, Signature};

/// The external work that produces a stage's artifacts.
pub trait StageWork {
    fn run(&mut self, stage_dir: &Path) -> Result<(), WorkError>;
}

impl<F> StageWork for F
where
    F: FnMut(&Path) -> Result<(), WorkError>,
{
    fn run(&mut self, stage_dir: &Path) -> Result<(), WorkError> {
        self(stage_dir)
    }
}

/// Cache state of a stage, as seen by [`PipelineRunner::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// A declared dependency has no lock record.
    MissingDependency { dependency: String },
    /// No lock record: the stage must run.
    NotCached,
    /// Lock record matches every dependency's live signature.
    Valid { record: LockRecord },
    /// A dependency changed since the stage was produced.
    Stale(DependencyMismatch),
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency { dependency } => write!(f, "BLOCKED ({dependency})"),
            Self::NotCached => f.write_str("NOT_CACHED"),
            Self::Valid { .. } => f.write_str("CACHED"),
            Self::Stale(m) => write!(f, "STALE ({})", m.dependency),
        }
    }
}

/// How a successful [`PipelineRunner::run`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Valid cache; no work executed.
    Cached(LockRecord),
    /// Work executed and a fresh record committed.
    Committed(LockRecord),
}

impl RunOutcome {
    pub fn record(&self) -> &LockRecord {
        match self {
            Self::Cached(r) | Self::Committed(r) => r,
        }
    }

    pub fn was_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Run even when the cache is valid or stale. Dependencies must still
    /// be locked.
    pub force: bool,
    /// On a cache hit, re-sign the stage's artifacts and compare with the
    /// recorded own signature.
    pub verify_integrity: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            verify_integrity: true,
        }
    }
}

/// Drives one stage through the locking protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineRunner {
    options: RunOptions,
}

impl PipelineRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Determine the cache state of `target` without touching anything.
    pub fn check(&self, target: &dyn LockManager) -> Result<CacheStatus, LockError> {
        Ok(self.inspect(target)?.0)
    }

    fn inspect(
        &self,
        target: &dyn LockManager,
    ) -> Result<(CacheStatus, Option<BTreeMap<String, Signature>>), LockError> {
        for dep in target.dependencies() {
            if !dep.is_locked() {
                return Ok((
                    CacheStatus::MissingDependency {
                        dependency: dep.name().to_string(),
                    },
                    None,
                ));
            }
        }

        let live = target.dependency_signatures()?;
        let Some(record) = target.store().load()? else {
            return Ok((CacheStatus::NotCached, Some(live)));
        };

        for (name, sig) in &live {
            log::debug!(
                "{}: {name} live {} recorded {}",
                target.name(),
                sig.short(),
                record
                    .dependency_signatures
                    .get(name)
                    .map_or_else(|| "<none>".to_string(), Signature::short)
            );
        }

        let status = match record.first_mismatch(&live) {
            Some(mismatch) => CacheStatus::Stale(mismatch),
            None => CacheStatus::Valid { record },
        };
        Ok((status, Some(live)))
    }

    /// Compare a locked stage's current artifacts with its recorded own
    /// signature.
    ///
    /// Errors with `Unlocked` if the stage has no lock record and
    /// `CorruptCache` if the artifacts changed outside the protocol.
    pub fn verify(&self, target: &dyn LockManager) -> Result<LockRecord, LockError> {
        let record = target.store().load()?.ok_or_else(|| LockError::Unlocked {
            stage: target.name().to_string(),
        })?;
        self.verify_record(target, &record)?;
        Ok(record)
    }

    fn verify_record(
        &self,
        target: &dyn LockManager,
        record: &LockRecord,
    ) -> Result<(), LockError> {
        let current = target.signature()?;
        if current != record.own_signature {
            return Err(LockError::CorruptCache {
                stage: target.name().to_string(),
                recorded: record.own_signature,
                current,
            });
        }
        Ok(())
    }

    /// Run `target` through the full protocol.
    ///
    /// Verification failures abort before anything is mutated. A failure
    /// inside `work` restores the previous lock record byte for byte and is
    /// then returned. Cancellation leaves the record deleted.
    pub fn run(
        &self,
        target: &dyn LockManager,
        work: &mut dyn StageWork,
    ) -> Result<RunOutcome, LockError> {
        let stage = target.name();
        let (status, live) = self.inspect(target)?;

        match status {
            CacheStatus::MissingDependency { dependency } => {
                return Err(LockError::NotCached {
                    stage: stage.to_string(),
                    dependency,
                });
            }
            CacheStatus::Valid { record } if !self.options.force => {
                if self.options.verify_integrity {
                    self.verify_record(target, &record)?;
                }
                log::info!("{stage}: cached, skipping");
                return Ok(RunOutcome::Cached(record));
            }
            CacheStatus::Stale(mismatch) if !self.options.force => {
                return Err(LockError::StaleDependency {
                    stage: stage.to_string(),
                    dependency: mismatch.dependency,
                    recorded: mismatch.recorded,
                    current: mismatch.current,
                });
            }
            CacheStatus::NotCached => log::info!("{stage}: not cached"),
            CacheStatus::Valid { .. } | CacheStatus::Stale(_) => {
                log::info!("{stage}: forced rebuild");
            }
        }

        let captured = match live {
            Some(live) => live,
            None => target.dependency_signatures()?,
        };

        let store = target.store();
        let previous = store.delete()?;
        if let Some(previous) = &previous {
            log::info!(
                "{stage}: invalidated lock record (was {})",
                display_opt(&previous.record().own_signature)
            );
        }

        log::info!("{stage}: running");
        match work.run(target.dir()) {
            Ok(()) => {}
            Err(WorkError::Cancelled) => {
                log::warn!("{stage}: interrupted, lock record stays invalidated");
                return Err(LockError::Cancelled {
                    stage: stage.to_string(),
                });
            }
            Err(err) => {
                log::error!("{stage}: work failed: {err}");
                if let Some(previous) = &previous {
                    if let Err(restore_err) = store.restore(previous) {
                        return Err(LockError::RollbackFailed {
                            stage: stage.to_string(),
                            work: err,
                            source: Box::new(restore_err),
                        });
                    }
                    log::info!("{stage}: rolled back to previous lock record");
                }
                return Err(LockError::WorkExecution {
                    stage: stage.to_string(),
                    source: err,
                });
            }
        }

        match target.dependency_signatures() {
            Ok(after) if after != captured => log::warn!(
                "{stage}: dependencies changed while running; recording the signatures seen at start"
            ),
            Ok(_) => {}
            Err(e) => log::warn!("{stage}: could not re-read dependencies after run: {e}"),
        }
        let record = LockRecord::new(target.signature()?, captured);
        store.save(&record)?;
        log::info!(
            "{stage}: committed ({})",
            record
                .own_signature
                .map_or_else(|| "no own signature".to_string(), |s| s.short())
        );
        Ok(RunOutcome::Committed(record))
    }

    /// Forced invalidation: delete `target`'s lock record, whatever it holds.
    ///
    /// Returns whether a record was present.
    pub fn invalidate(&self, target: &dyn LockManager) -> Result<bool, LockError> {
        let removed = target.store().discard()?;
        if removed {
            log::info!("{}: lock record removed", target.name());
        }
        Ok(removed)
    }
}
