//! `labbook status` - cache state of every stage

use anyhow::Result;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use labbook_lock::{CacheStatus, ExperimentConfig, LockManager, PipelineRunner, StageKind};

pub fn run(layout: &ExperimentConfig) -> Result<()> {
    let runner = PipelineRunner::default();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Stage").fg(Color::Cyan),
            Cell::new("Dir").fg(Color::Cyan),
            Cell::new("Locked").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Signature").fg(Color::Cyan),
        ]);

    for kind in StageKind::ALL {
        let manager = layout.manager(kind);
        let (status, color) = status_cell(&runner, manager.as_ref());
        table.add_row(vec![
            Cell::new(kind.name()),
            Cell::new(manager.dir().display()),
            Cell::new(if manager.is_locked() { "yes" } else { "no" }),
            Cell::new(status).fg(color),
            Cell::new(recorded_signature(manager.as_ref())),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn status_cell(runner: &PipelineRunner, manager: &dyn LockManager) -> (String, Color) {
    match runner.check(manager) {
        Ok(status) => {
            let color = match status {
                CacheStatus::Valid { .. } => Color::Green,
                CacheStatus::NotCached => Color::Yellow,
                CacheStatus::Stale(_) | CacheStatus::MissingDependency { .. } => Color::Red,
            };
            (status.to_string(), color)
        }
        Err(e) => (format!("ERROR: {e}"), Color::Red),
    }
}

/// Own signature stored in the lock record, if any.
fn recorded_signature(manager: &dyn LockManager) -> String {
    match manager.store().load() {
        Ok(Some(record)) => record
            .own_signature
            .map_or_else(|| "-".to_string(), |s| s.short()),
        Ok(None) => String::new(),
        Err(_) => "unreadable".to_string(),
    }
}
