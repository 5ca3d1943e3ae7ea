//! `labbook invalidate` - forced invalidation of a stage's lock record

use anyhow::Result;
use clap::Args;
use labbook_lock::{ExperimentConfig, PipelineRunner, StageKind};

#[derive(Args, Debug)]
pub struct InvalidateArgs {
    /// Stage whose lock record is removed
    pub stage: StageKind,
}

pub fn run(args: InvalidateArgs, layout: &ExperimentConfig) -> Result<()> {
    let manager = layout.manager(args.stage);
    if PipelineRunner::default().invalidate(manager.as_ref())? {
        println!("{}: invalidated, the next run rebuilds it", args.stage);
    } else {
        println!("{}: not locked, nothing to do", args.stage);
    }
    Ok(())
}
