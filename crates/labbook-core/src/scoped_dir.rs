//! Scoped working directory
//!
//! The process working directory is global state: hold at most one
//! [`ScopedChdir`] at a time, from a single thread.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

/// Changes the working directory for as long as it lives.
///
/// The previous directory is restored on drop, which covers early returns,
/// `?` and unwinding alike.
#[must_use = "the previous directory is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopedChdir {
    previous: PathBuf,
}

impl ScopedChdir {
    pub fn enter(dir: &Path) -> io::Result<Self> {
        let previous = env::current_dir()?;
        env::set_current_dir(dir)?;
        log::debug!("chdir {} (from {})", dir.display(), previous.display());
        Ok(Self { previous })
    }

    /// Directory restored on drop.
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for ScopedChdir {
    fn drop(&mut self) {
        if let Err(e) = env::set_current_dir(&self.previous) {
            log::error!(
                "failed to restore working directory {}: {e}",
                self.previous.display()
            );
        }
    }
}

/// Serializes tests that touch the process working directory.
#[cfg(test)]
pub(crate) fn cwd_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_on_drop() {
        let _lock = cwd_lock();
        let dir = tempfile::tempdir().unwrap();
        let start = env::current_dir().unwrap();
        {
            let guard = ScopedChdir::enter(dir.path()).unwrap();
            assert_eq!(
                env::current_dir().unwrap().canonicalize().unwrap(),
                dir.path().canonicalize().unwrap()
            );
            assert_eq!(guard.previous(), start);
        }
        assert_eq!(env::current_dir().unwrap(), start);
    }

    #[test]
    fn restores_on_early_return() {
        fn fails_inside(dir: &Path) -> io::Result<()> {
            let _cwd = ScopedChdir::enter(dir)?;
            Err(io::Error::other("stage failed"))
        }

        let _lock = cwd_lock();
        let dir = tempfile::tempdir().unwrap();
        let start = env::current_dir().unwrap();
        assert!(fails_inside(dir.path()).is_err());
        assert_eq!(env::current_dir().unwrap(), start);
    }

    #[test]
    fn restores_on_panic() {
        let _lock = cwd_lock();
        let dir = tempfile::tempdir().unwrap();
        let start = env::current_dir().unwrap();
        let path = dir.path().to_path_buf();
        let result = std::panic::catch_unwind(move || {
            let _cwd = ScopedChdir::enter(&path).unwrap();
            panic!("tool crashed");
        });
        assert!(result.is_err());
        assert_eq!(env::current_dir().unwrap(), start);
    }

    #[test]
    fn missing_dir_leaves_cwd_alone() {
        let _lock = cwd_lock();
        let dir = tempfile::tempdir().unwrap();
        let start = env::current_dir().unwrap();
        assert!(ScopedChdir::enter(&dir.path().join("missing")).is_err());
        assert_eq!(env::current_dir().unwrap(), start);
    }
}
