//! Experiment layout: parse labbook.toml and build the per-stage lock managers

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::manager::{ConfigLock, CorpusLock, ExperimentLock, LockManager, SampleLock};
use crate::stage::StageKind;

/// Top-level labbook.toml structure.
///
/// ```toml
/// root = "./lab"
///
/// [corpus]
/// dir = "corpus/enwiki"
///
/// [sample]
/// name = "wiki-10k"
/// command = "bitfunnel filter ../../corpus/enwiki --size 10000"
///
/// [config]
///
/// [experiment]
/// command = "bitfunnel repl ../config --script queries.txt"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Directory every stage `dir` is relative to.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    pub corpus: StageConfig,
    pub sample: SampleConfig,
    pub config: StageConfig,
    pub experiment: StageConfig,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Artifact directory, relative to `root`. Defaults to the stage name.
    pub dir: Option<PathBuf>,
    /// Command producing the stage's artifacts, run inside `dir`.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleConfig {
    /// Declared sample name; part of the sample's signature.
    pub name: String,
    /// Artifact directory, relative to `root`. Defaults to `samples/{name}`.
    pub dir: Option<PathBuf>,
    pub command: Option<String>,
}

impl ExperimentConfig {
    /// Parse labbook.toml; a relative `root` is resolved against the file's
    /// directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read experiment config: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse experiment config: {}", path.display()))?;
        if config.root.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.root = base.join(&config.root);
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject layouts the locking protocol cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sample.name.trim().is_empty() {
            anyhow::bail!("[sample] name must not be empty");
        }

        let mut seen = BTreeSet::new();
        for kind in StageKind::ALL {
            let dir = self.stage_dir(kind);
            if !seen.insert(dir.clone()) {
                anyhow::bail!(
                    "[{kind}] dir {} is shared with another stage; each stage owns its directory",
                    dir.display()
                );
            }
            self.command(kind)?;
        }
        Ok(())
    }

    fn stage_config(&self, kind: StageKind) -> (Option<&PathBuf>, Option<&String>) {
        match kind {
            StageKind::Corpus => (self.corpus.dir.as_ref(), self.corpus.command.as_ref()),
            StageKind::Sample => (self.sample.dir.as_ref(), self.sample.command.as_ref()),
            StageKind::Config => (self.config.dir.as_ref(), self.config.command.as_ref()),
            StageKind::Experiment => (
                self.experiment.dir.as_ref(),
                self.experiment.command.as_ref(),
            ),
        }
    }

    /// Artifact directory of a stage.
    pub fn stage_dir(&self, kind: StageKind) -> PathBuf {
        match self.stage_config(kind).0 {
            Some(dir) => self.root.join(dir),
            None if kind == StageKind::Sample => {
                self.root.join("samples").join(&self.sample.name)
            }
            None => self.root.join(kind.name()),
        }
    }

    /// Command line for a stage, split shell-style. `None` if unset.
    pub fn command(&self, kind: StageKind) -> Result<Option<Vec<String>>> {
        let Some(command) = self.stage_config(kind).1 else {
            return Ok(None);
        };
        let args = shell_words::split(command)
            .with_context(|| format!("[{kind}] failed to parse command: {command}"))?;
        if args.is_empty() {
            anyhow::bail!("[{kind}] command is empty");
        }
        Ok(Some(args))
    }

    pub fn corpus_lock(&self) -> CorpusLock {
        CorpusLock::new(self.stage_dir(StageKind::Corpus))
    }

    pub fn sample_lock(&self) -> SampleLock {
        SampleLock::new(
            self.stage_dir(StageKind::Sample),
            self.sample.name.clone(),
            self.corpus_lock(),
        )
    }

    pub fn config_lock(&self) -> ConfigLock {
        ConfigLock::new(self.stage_dir(StageKind::Config), self.sample_lock())
    }

    pub fn experiment_lock(&self) -> ExperimentLock {
        ExperimentLock::new(
            self.stage_dir(StageKind::Experiment),
            self.config_lock(),
            self.sample_lock(),
        )
    }

    /// Lock manager for any stage kind.
    pub fn manager(&self, kind: StageKind) -> Box<dyn LockManager> {
        match kind {
            StageKind::Corpus => Box::new(self.corpus_lock()),
            StageKind::Sample => Box::new(self.sample_lock()),
            StageKind::Config => Box::new(self.config_lock()),
            StageKind::Experiment => Box::new(self.experiment_lock()),
        }
    }
}
