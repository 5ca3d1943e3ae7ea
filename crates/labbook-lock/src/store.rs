//! Durable lock record storage for one stage directory
//!
//! Layout:
//! ```text
//! {stage-dir}/
//! ├── LOCKFILE        # present = cached and valid
//! ├── LOCKFILE.tmp    # transient, only while a save is in flight
//! └── ...             # stage artifacts
//! ```
//!
//! Every write goes through `LOCKFILE.tmp` + fsync + rename + directory
//! fsync, so after a crash the lock file is either the old record, absent,
//! or the new record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::LockError;
use crate::record::{LockRecord, LOCKFILE, LOCKFILE_TMP};

/// A lock record removed from disk, kept so it can be put back verbatim.
#[derive(Debug, Clone)]
pub struct CheckedOut {
    bytes: Vec<u8>,
    record: LockRecord,
}

impl CheckedOut {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }
}

/// Lock record store rooted at a stage directory.
#[derive(Debug, Clone)]
pub struct LockStore {
    dir: PathBuf,
}

impl LockStore {
    pub fn new(stage_dir: &Path) -> Self {
        Self {
            dir: stage_dir.to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LOCKFILE)
    }

    fn tmp_path(&self) -> PathBuf {
        self.dir.join(LOCKFILE_TMP)
    }

    /// Whether a lock record exists.
    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Load the lock record, `None` if there is none.
    ///
    /// An unreadable or unparseable record is an error, never "absent".
    pub fn load(&self) -> Result<Option<LockRecord>, LockError> {
        Ok(self.read_raw()?.map(|(_, record)| record))
    }

    fn read_raw(&self) -> Result<Option<(Vec<u8>, LockRecord)>, LockError> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LockError::io("failed to read lock record", path, e)),
        };
        let record = LockRecord::from_bytes(&bytes)
            .map_err(|source| LockError::Malformed { path, source })?;
        Ok(Some((bytes, record)))
    }

    /// Durably replace the lock record.
    pub fn save(&self, record: &LockRecord) -> Result<(), LockError> {
        let bytes = record
            .to_bytes()
            .map_err(|source| LockError::Malformed {
                path: self.path(),
                source,
            })?;
        self.write_atomic(&bytes)
    }

    /// Put back a record removed by [`LockStore::delete`], byte for byte.
    pub fn restore(&self, previous: &CheckedOut) -> Result<(), LockError> {
        self.write_atomic(&previous.bytes)
    }

    /// Durably remove the lock record, returning what was there.
    pub fn delete(&self) -> Result<Option<CheckedOut>, LockError> {
        let Some((bytes, record)) = self.read_raw()? else {
            return Ok(None);
        };
        let path = self.path();
        fs::remove_file(&path)
            .map_err(|e| LockError::io("failed to delete lock record", &path, e))?;
        self.sync_dir()?;
        log::debug!("invalidated {}", path.display());
        Ok(Some(CheckedOut { bytes, record }))
    }

    /// Durably remove the lock record without reading it first.
    ///
    /// Used for forced invalidation, where even a malformed record must go.
    /// Returns whether a record was present.
    pub fn discard(&self) -> Result<bool, LockError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LockError::io("failed to delete lock record", path, e)),
        }
        self.sync_dir()?;
        Ok(true)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), LockError> {
        let tmp = self.tmp_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| LockError::io("failed to create temporary lock record", &tmp, e))?;
        file.write_all(bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| LockError::io("failed to write temporary lock record", &tmp, e))?;
        drop(file);

        let path = self.path();
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            LockError::io("failed to move lock record into place", &path, e)
        })?;
        self.sync_dir()
    }

    /// Make a rename or unlink in the stage directory durable.
    fn sync_dir(&self) -> Result<(), LockError> {
        #[cfg(unix)]
        {
            File::open(&self.dir)
                .and_then(|dir| dir.sync_all())
                .map_err(|e| LockError::io("failed to sync stage directory", &self.dir, e))?;
        }
        Ok(())
    }
}
