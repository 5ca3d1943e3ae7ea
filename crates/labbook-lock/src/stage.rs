//! Stage kinds and artifact enumeration

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::hash;
use crate::record::is_lock_file_name;
use crate::signature::Signature;

/// Pipeline stage identifier.
///
/// The dependency graph is fixed: corpus → sample → config → experiment,
/// with experiment also reading the sample directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Corpus,
    Sample,
    Config,
    Experiment,
}

impl StageKind {
    /// All stages in dependency order.
    pub const ALL: [StageKind; 4] = [Self::Corpus, Self::Sample, Self::Config, Self::Experiment];

    /// Key used in lock records and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Corpus => "corpus",
            Self::Sample => "sample",
            Self::Config => "config",
            Self::Experiment => "experiment",
        }
    }

    /// Declared dependencies of this stage kind.
    pub fn dependencies(self) -> &'static [StageKind] {
        match self {
            Self::Corpus => &[],
            Self::Sample => &[Self::Corpus],
            Self::Config => &[Self::Sample],
            Self::Experiment => &[Self::Config, Self::Sample],
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                format!("unknown stage '{s}' (expected corpus, sample, config or experiment)")
            })
    }
}

/// Signature of every data file in a stage directory.
pub fn signature_of_dir(dir: &Path) -> io::Result<Signature> {
    let root = artifact_root(dir)?;
    let files = data_files(&root)?;
    hash::signature_of_files(&root, &files)
}

/// Canonical form of a stage directory, so relative keys never depend on
/// how the directory was spelled.
fn artifact_root(dir: &Path) -> io::Result<PathBuf> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("stage directory {} does not exist", dir.display()),
        ));
    }
    dir.canonicalize()
}

/// Every data file under a stage directory, recursively, sorted.
///
/// Lock files are not artifacts and are skipped. A missing directory is an
/// error: a stage with no artifact root has nothing to sign.
pub fn data_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = artifact_root(dir)?;
    let dir = dir.as_path();

    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join("**/*");
    let paths = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if !path.is_file() {
            continue;
        }
        let is_lock = path.parent() == Some(dir)
            && path
                .file_name()
                .is_some_and(|n| is_lock_file_name(&n.to_string_lossy()));
        if !is_lock {
            files.push(path);
        }
    }

    // Sort for deterministic order
    files.sort();
    Ok(files)
}
