//! Per-stage lock managers
//!
//! Each stage kind knows how to sign its own artifacts and which upstream
//! stages it reads. All operations are read-only: they observe the current
//! state of the artifact directories and lock files and never mutate them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::LockError;
use crate::hash;
use crate::signature::Signature;
use crate::stage::{self, StageKind};
use crate::store::LockStore;

/// Uniform view of a stage for the pipeline runner.
pub trait LockManager {
    fn kind(&self) -> StageKind;

    /// Artifact root owned by this stage (holds its `LOCKFILE`).
    fn dir(&self) -> &Path;

    /// Upstream stages this one reads.
    fn dependencies(&self) -> Vec<&dyn LockManager>;

    /// Signature of this stage's own artifacts, computed fresh.
    ///
    /// `None` for terminal stages that nothing depends on.
    fn signature(&self) -> Result<Option<Signature>, LockError>;

    /// Live signatures of every declared dependency, keyed by stage name.
    ///
    /// Fails with [`LockError::NotCached`] if a dependency has no lock
    /// record: an unlocked stage's artifacts may be half-written.
    fn dependency_signatures(&self) -> Result<BTreeMap<String, Signature>, LockError> {
        let mut sigs = BTreeMap::new();
        for dep in self.dependencies() {
            if !dep.is_locked() {
                return Err(LockError::NotCached {
                    stage: self.name().to_string(),
                    dependency: dep.name().to_string(),
                });
            }
            let sig = dep.signature()?.ok_or_else(|| LockError::NotCached {
                stage: self.name().to_string(),
                dependency: dep.name().to_string(),
            })?;
            sigs.insert(dep.name().to_string(), sig);
        }
        Ok(sigs)
    }

    /// Whether a lock record currently exists for this stage.
    fn is_locked(&self) -> bool {
        self.store().exists()
    }

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn store(&self) -> LockStore {
        LockStore::new(self.dir())
    }
}

fn dir_signature(kind: StageKind, dir: &Path) -> Result<Signature, LockError> {
    stage::signature_of_dir(dir)
        .map_err(|e| LockError::io(signature_context(kind), dir, e))
}

fn signature_context(kind: StageKind) -> &'static str {
    match kind {
        StageKind::Corpus => "failed to sign corpus data",
        StageKind::Sample => "failed to sign sample data",
        StageKind::Config => "failed to sign config outputs",
        StageKind::Experiment => "failed to sign experiment outputs",
    }
}

/// Corpus: the raw data every sample is drawn from. No dependencies.
#[derive(Debug, Clone)]
pub struct CorpusLock {
    dir: PathBuf,
}

impl CorpusLock {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl LockManager for CorpusLock {
    fn kind(&self) -> StageKind {
        StageKind::Corpus
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn dependencies(&self) -> Vec<&dyn LockManager> {
        Vec::new()
    }

    fn signature(&self) -> Result<Option<Signature>, LockError> {
        dir_signature(self.kind(), &self.dir).map(Some)
    }
}

/// Sample: a named subset filtered out of the corpus.
///
/// The name is part of the signature, so two samples with identical content
/// but different names are never interchangeable.
#[derive(Debug, Clone)]
pub struct SampleLock {
    dir: PathBuf,
    name: String,
    corpus: CorpusLock,
}

impl SampleLock {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, corpus: CorpusLock) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            corpus,
        }
    }
}

impl LockManager for SampleLock {
    fn kind(&self) -> StageKind {
        StageKind::Sample
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn dependencies(&self) -> Vec<&dyn LockManager> {
        vec![&self.corpus]
    }

    fn signature(&self) -> Result<Option<Signature>, LockError> {
        let content = dir_signature(self.kind(), &self.dir)?;
        Ok(Some(hash::signature_with_label(&self.name, &content)))
    }
}

/// Config: files generated by the configuration step over a sample.
#[derive(Debug, Clone)]
pub struct ConfigLock {
    dir: PathBuf,
    sample: SampleLock,
}

impl ConfigLock {
    pub fn new(dir: impl Into<PathBuf>, sample: SampleLock) -> Self {
        Self {
            dir: dir.into(),
            sample,
        }
    }
}

impl LockManager for ConfigLock {
    fn kind(&self) -> StageKind {
        StageKind::Config
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn dependencies(&self) -> Vec<&dyn LockManager> {
        vec![&self.sample]
    }

    fn signature(&self) -> Result<Option<Signature>, LockError> {
        dir_signature(self.kind(), &self.dir).map(Some)
    }
}

/// Experiment: terminal stage run against a config and its sample.
#[derive(Debug, Clone)]
pub struct ExperimentLock {
    dir: PathBuf,
    config: ConfigLock,
    sample: SampleLock,
}

impl ExperimentLock {
    pub fn new(dir: impl Into<PathBuf>, config: ConfigLock, sample: SampleLock) -> Self {
        Self {
            dir: dir.into(),
            config,
            sample,
        }
    }
}

impl LockManager for ExperimentLock {
    fn kind(&self) -> StageKind {
        StageKind::Experiment
    }

    fn dir(&self) -> &Path {
        &self.dir
    }

    fn dependencies(&self) -> Vec<&dyn LockManager> {
        vec![&self.config, &self.sample]
    }

    // Nothing downstream reads an experiment.
    fn signature(&self) -> Result<Option<Signature>, LockError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LockRecord;

    struct Layout {
        _tmp: tempfile::TempDir,
        corpus: CorpusLock,
        sample: SampleLock,
        config: ConfigLock,
        experiment: ExperimentLock,
    }

    fn layout() -> Layout {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for d in ["corpus", "sample", "config", "experiment"] {
            std::fs::create_dir_all(root.join(d)).unwrap();
        }
        std::fs::write(root.join("corpus/docs.txt"), b"doc one\ndoc two\n").unwrap();
        std::fs::write(root.join("sample/docs.txt"), b"doc one\n").unwrap();
        std::fs::write(root.join("config/manifest.txt"), b"docs.txt\n").unwrap();

        let corpus = CorpusLock::new(root.join("corpus"));
        let sample = SampleLock::new(root.join("sample"), "small", corpus.clone());
        let config = ConfigLock::new(root.join("config"), sample.clone());
        let experiment =
            ExperimentLock::new(root.join("experiment"), config.clone(), sample.clone());
        Layout {
            _tmp: tmp,
            corpus,
            sample,
            config,
            experiment,
        }
    }

    fn lock(manager: &dyn LockManager) {
        manager
            .store()
            .save(&LockRecord::new(manager.signature().unwrap(), BTreeMap::new()))
            .unwrap();
    }

    #[test]
    fn corpus_has_no_dependencies() {
        let l = layout();
        assert!(l.corpus.dependency_signatures().unwrap().is_empty());
        assert!(l.corpus.signature().unwrap().is_some());
    }

    #[test]
    fn sample_depends_on_corpus_signature() {
        let l = layout();
        lock(&l.corpus);
        let deps = l.sample.dependency_signatures().unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps["corpus"], l.corpus.signature().unwrap().unwrap());
    }

    #[test]
    fn experiment_depends_on_config_and_sample() {
        let l = layout();
        lock(&l.config);
        lock(&l.sample);
        let deps = l.experiment.dependency_signatures().unwrap();
        assert_eq!(
            deps.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["config", "sample"]
        );
        assert_eq!(deps["config"], l.config.signature().unwrap().unwrap());
        assert_eq!(deps["sample"], l.sample.signature().unwrap().unwrap());
        assert!(l.experiment.signature().unwrap().is_none());
    }

    #[test]
    fn sample_name_is_part_of_signature() {
        let l = layout();
        let renamed = SampleLock::new(l.sample.dir(), "other", l.corpus.clone());
        assert_ne!(
            l.sample.signature().unwrap(),
            renamed.signature().unwrap()
        );
    }

    #[test]
    fn identical_content_different_stage_dirs() {
        let l = layout();
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("docs.txt"), b"doc one\n").unwrap();
        let twin = SampleLock::new(tmp.path(), "small", l.corpus.clone());
        assert_eq!(l.sample.signature().unwrap(), twin.signature().unwrap());
    }

    #[test]
    fn signature_tracks_current_content() {
        let l = layout();
        let before = l.config.signature().unwrap();
        std::fs::write(l.config.dir().join("extra.bin"), b"x").unwrap();
        assert_ne!(before, l.config.signature().unwrap());
    }

    #[test]
    fn missing_artifacts_are_io_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = CorpusLock::new(tmp.path().join("gone"));
        assert!(matches!(corpus.signature(), Err(LockError::Io { .. })));
    }

    #[test]
    fn unlocked_dependency_is_not_cached() {
        let l = layout();
        lock(&l.sample);
        // config is readable but was never locked
        let err = l.experiment.dependency_signatures().unwrap_err();
        assert!(matches!(
            err,
            LockError::NotCached { ref stage, ref dependency }
                if stage == "experiment" && dependency == "config"
        ));
    }

    #[test]
    fn is_locked_follows_lock_file() {
        let l = layout();
        assert!(!l.sample.is_locked());
        l.sample
            .store()
            .save(&LockRecord::new(None, BTreeMap::new()))
            .unwrap();
        assert!(l.sample.is_locked());
        assert!(!l.corpus.is_locked());
    }

    #[test]
    fn lock_file_does_not_change_signature() {
        let l = layout();
        let before = l.corpus.signature().unwrap();
        l.corpus
            .store()
            .save(&LockRecord::new(before, BTreeMap::new()))
            .unwrap();
        assert_eq!(l.corpus.signature().unwrap(), before);
    }
}
