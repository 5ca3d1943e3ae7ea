//! `labbook run` - run stages through the lock protocol

use std::path::Path;

use anyhow::Result;
use clap::Args;
use labbook_core::{CommandError, ProgressContext, is_shutdown_requested, run_command};
use labbook_lock::{
    ExperimentConfig, LockManager, PipelineRunner, RunOptions, RunOutcome, StageKind, WorkError,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stage to run (corpus, sample, config, experiment). Default: all, in order
    pub stage: Option<StageKind>,

    /// Rebuild even if the cache is valid or stale
    #[arg(long)]
    pub force: bool,

    /// Show stage status without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip re-signing artifacts on a cache hit
    #[arg(long)]
    pub no_verify: bool,
}

pub fn run(args: RunArgs, layout: &ExperimentConfig, progress: &ProgressContext) -> Result<()> {
    let runner = PipelineRunner::new(RunOptions {
        force: args.force,
        verify_integrity: !args.no_verify,
    });
    let stages = match args.stage {
        Some(kind) => vec![kind],
        None => StageKind::ALL.to_vec(),
    };

    if args.dry_run {
        for kind in stages {
            let manager = layout.manager(kind);
            println!("{:<12} {}", kind, runner.check(manager.as_ref())?);
        }
        println!("(dry-run mode, no execution)");
        return Ok(());
    }

    for kind in stages {
        if is_shutdown_requested() {
            anyhow::bail!("shutdown requested, not starting {kind}");
        }
        let manager = layout.manager(kind);
        let command = layout.command(kind)?;
        let outcome = run_stage(&runner, manager.as_ref(), command.as_deref(), progress)?;
        let state = if outcome.was_cached() {
            "cached"
        } else {
            "committed"
        };
        let signature = outcome
            .record()
            .own_signature
            .map_or_else(|| "-".to_string(), |s| s.short());
        progress.println(format!("{kind:<12} {state:<10} {signature}"));
    }
    Ok(())
}

fn run_stage(
    runner: &PipelineRunner,
    manager: &dyn LockManager,
    command: Option<&[String]>,
    progress: &ProgressContext,
) -> Result<RunOutcome> {
    let pb = progress.stage_line(manager.name());
    pb.set_message("checking");

    let mut work = |dir: &Path| -> Result<(), WorkError> {
        let Some(args) = command else {
            log::info!(
                "{}: no command configured, locking artifacts as they are",
                manager.name()
            );
            return Ok(());
        };
        pb.set_message(args.join(" "));
        run_command(args, dir).map_err(|e| work_error(e, is_shutdown_requested()))
    };

    let result = runner.run(manager, &mut work);
    pb.finish_and_clear();
    Ok(result?)
}

/// Any command failure once shutdown was requested counts as cancellation,
/// so the stage stays invalidated instead of rolling back.
fn work_error(err: CommandError, shutting_down: bool) -> WorkError {
    match err {
        CommandError::Interrupted { .. } => WorkError::Cancelled,
        _ if shutting_down => {
            log::warn!("{err} after shutdown was requested");
            WorkError::Cancelled
        }
        e => WorkError::Failed(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> CommandError {
        CommandError::Spawn {
            program: "bitfunnel".into(),
            source: std::io::Error::other("killed"),
        }
    }

    #[test]
    fn interrupted_command_cancels() {
        let err = CommandError::Interrupted {
            program: "bitfunnel".into(),
        };
        assert!(matches!(work_error(err, false), WorkError::Cancelled));
    }

    #[test]
    fn failure_during_shutdown_cancels() {
        assert!(matches!(work_error(failed(), true), WorkError::Cancelled));
    }

    #[test]
    fn failure_without_shutdown_rolls_back() {
        assert!(matches!(work_error(failed(), false), WorkError::Failed(_)));
    }
}
