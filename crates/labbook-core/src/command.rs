//! Stage command execution inside a stage directory

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::scoped_dir::ScopedChdir;
use crate::shutdown::shutdown_flag;

/// How often a running command is checked for exit or shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("cannot enter {}: {source}", .dir.display())]
    Chdir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("{program} was interrupted")]
    Interrupted { program: String },
}

/// Run `args` with `dir` as working directory, blocking until it exits.
///
/// The child inherits stdio. If shutdown is requested while it runs, the
/// child is killed and [`CommandError::Interrupted`] is returned.
pub fn run_command(args: &[String], dir: &Path) -> Result<(), CommandError> {
    run_command_until(args, dir, shutdown_flag())
}

fn run_command_until(args: &[String], dir: &Path, stop: &AtomicBool) -> Result<(), CommandError> {
    let (program, rest) = args.split_first().ok_or(CommandError::Empty)?;

    let _cwd = ScopedChdir::enter(dir).map_err(|source| CommandError::Chdir {
        dir: dir.to_path_buf(),
        source,
    })?;

    log::debug!("exec: {}", args.join(" "));
    let spawn_err = |source| CommandError::Spawn {
        program: program.clone(),
        source,
    };
    let mut child = Command::new(program).args(rest).spawn().map_err(spawn_err)?;

    loop {
        if let Some(status) = child.try_wait().map_err(spawn_err)? {
            if status.success() {
                return Ok(());
            }
            // A terminal Ctrl-C reaches the whole process group, so the child
            // often dies from the same signal before the flag is polled.
            if stop.load(Ordering::Relaxed) {
                log::warn!("{program} exited with {status} during shutdown");
                return Err(CommandError::Interrupted {
                    program: program.clone(),
                });
            }
            return Err(CommandError::Failed {
                program: program.clone(),
                status,
            });
        }
        if stop.load(Ordering::Relaxed) {
            log::warn!("stopping {program}");
            let _ = child.kill();
            let _ = child.wait();
            return Err(CommandError::Interrupted {
                program: program.clone(),
            });
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
