//! `labbook verify` - re-sign locked stages and compare with their records

use anyhow::Result;
use clap::Args;
use labbook_lock::{ExperimentConfig, LockError, PipelineRunner, StageKind};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Stage to verify. Default: every locked stage
    pub stage: Option<StageKind>,
}

pub fn run(args: VerifyArgs, layout: &ExperimentConfig) -> Result<()> {
    let runner = PipelineRunner::default();
    let explicit = args.stage.is_some();
    let stages = match args.stage {
        Some(kind) => vec![kind],
        None => StageKind::ALL.to_vec(),
    };

    let mut first_failure: Option<LockError> = None;
    for kind in stages {
        let manager = layout.manager(kind);
        match runner.verify(manager.as_ref()) {
            Ok(record) => {
                let signature = record
                    .own_signature
                    .map_or_else(|| "-".to_string(), |s| s.short());
                println!("{kind:<12} ok         {signature}");
            }
            Err(LockError::Unlocked { .. }) if !explicit => {
                println!("{kind:<12} unlocked");
            }
            Err(e) => {
                println!("{kind:<12} FAILED");
                log::error!("{e}");
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
