//! labbook - run a staged experiment with dependency-signature caching
//!
//! Each stage (corpus, sample, config, experiment) is rebuilt only when
//! it is not cached; a stage whose dependencies changed is refused until
//! the dependency is re-run or the stage is forced.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use labbook_core::{ProgressContext, Verbosity};
use labbook_lock::{ExperimentConfig, LockError, StageKind};

mod cmd;
mod config;

#[derive(Parser)]
#[command(name = "labbook")]
#[command(about = "Dependency-signature caching for staged experiments")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Experiment layout (default: ./labbook.toml or ~/.config/labbook/labbook.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the cache state of every stage
    Status,
    /// Run stages through the lock protocol
    Run(cmd::run::RunArgs),
    /// Remove a stage's lock record so it is rebuilt
    Invalidate(cmd::invalidate::InvalidateArgs),
    /// Check locked stages' artifacts against their recorded signatures
    Verify(cmd::verify::VerifyArgs),
    /// Show the experiment layout
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = ProgressContext::new();
    let multi = progress.is_tty().then(|| progress.multi());
    if let Err(e) = labbook_core::init_logging(Verbosity::from_flags(cli.quiet, cli.debug), multi) {
        eprintln!("failed to initialize logging: {e}");
    }

    match run(cli, &progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code(&err)
        }
    }
}

fn run(cli: Cli, progress: &ProgressContext) -> Result<()> {
    labbook_core::install_signal_handlers().context("failed to install signal handlers")?;
    let layout = config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Status => cmd::status::run(&layout),
        Command::Run(args) => cmd::run::run(args, &layout, progress),
        Command::Invalidate(args) => cmd::invalidate::run(args, &layout),
        Command::Verify(args) => cmd::verify::run(args, &layout),
        Command::Config => {
            print_layout(&layout);
            Ok(())
        }
    }
}

/// 1: verification abort (nothing mutated), 130: interrupted, 2: anything else.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    let lock_error = err.chain().find_map(|e| e.downcast_ref::<LockError>());
    match lock_error {
        Some(LockError::Cancelled { .. }) => ExitCode::from(130),
        Some(e) if e.is_verification_failure() => ExitCode::from(1),
        _ if labbook_core::is_shutdown_requested() => ExitCode::from(130),
        _ => ExitCode::from(2),
    }
}

fn print_layout(layout: &ExperimentConfig) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("Dir").fg(Color::Cyan),
            Cell::new("Depends on").fg(Color::Cyan),
            Cell::new("Command").fg(Color::Cyan),
        ]);

    for kind in StageKind::ALL {
        let deps: Vec<&str> = kind.dependencies().iter().map(|d| d.name()).collect();
        let command = match layout.command(kind) {
            Ok(Some(args)) => args.join(" "),
            Ok(None) => "(none)".to_string(),
            Err(e) => format!("invalid: {e}"),
        };
        table.add_row(vec![
            Cell::new(kind.name()),
            Cell::new(layout.stage_dir(kind).display()),
            Cell::new(deps.join(", ")),
            Cell::new(command),
        ]);
    }
    table.add_row(vec!["sample name", layout.sample.name.as_str(), "", ""]);

    eprintln!("\n{table}");
}
