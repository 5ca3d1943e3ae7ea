//! Lock record: the persisted proof that a stage's artifacts are valid

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::signature::{self, Signature};

/// File name of the lock record inside a stage directory.
pub const LOCKFILE: &str = "LOCKFILE";

/// Temporary sibling used while a new record is being written.
pub const LOCKFILE_TMP: &str = "LOCKFILE.tmp";

/// Whether a file name belongs to the locking protocol rather than to the
/// stage's artifacts.
pub fn is_lock_file_name(name: &str) -> bool {
    name == LOCKFILE || name == LOCKFILE_TMP
}

/// Signatures recorded when a stage was last produced successfully.
///
/// Never mutated once written: a stage replaces its record wholesale or
/// deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LockRecord {
    /// Signature of the stage's own artifacts. Absent for terminal stages.
    #[serde(with = "signature::empty_as_none")]
    pub own_signature: Option<Signature>,
    /// Dependency name → its signature when this stage was produced.
    pub dependency_signatures: BTreeMap<String, Signature>,
}

impl LockRecord {
    pub fn new(
        own_signature: Option<Signature>,
        dependency_signatures: BTreeMap<String, Signature>,
    ) -> Self {
        Self {
            own_signature,
            dependency_signatures,
        }
    }

    /// Canonical on-disk bytes (pretty JSON, trailing newline).
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Compare recorded dependency signatures against live ones, key by key
    /// over the union of both key sets.
    ///
    /// Returns the first mismatch in key order.
    pub fn first_mismatch(&self, live: &BTreeMap<String, Signature>) -> Option<DependencyMismatch> {
        let mut names: Vec<&String> = self
            .dependency_signatures
            .keys()
            .chain(live.keys())
            .collect();
        names.sort();
        names.dedup();

        names.into_iter().find_map(|name| {
            let recorded = self.dependency_signatures.get(name).copied();
            let current = live.get(name).copied();
            (recorded != current).then(|| DependencyMismatch {
                dependency: name.clone(),
                recorded,
                current,
            })
        })
    }
}

/// A dependency whose recorded and live signatures disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMismatch {
    pub dependency: String,
    pub recorded: Option<Signature>,
    pub current: Option<Signature>,
}
