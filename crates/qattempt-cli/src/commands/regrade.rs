//! The `qattempt regrade` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Cell, Table};
use uuid::Uuid;

use qattempt_core::engine::{BatchRegrade, QuestionEngine};
use qattempt_store::config::load_config_from;
use qattempt_store::{create_store, TomlQuestionBank};

use super::format_mark;

pub async fn execute(
    usages: Vec<Uuid>,
    all: bool,
    bank_path: PathBuf,
    dry_run: bool,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{format}', expected text or json"
    );

    let config = load_config_from(config_path.as_deref())?;
    let bank = Arc::new(TomlQuestionBank::load(&bank_path)?);
    let engine = QuestionEngine::new(create_store(&config.store), bank, config.engine_config());

    let ids = if all {
        engine
            .list_usages()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect()
    } else {
        usages
    };

    tracing::debug!(usages = ids.len(), dry_run, "regrading");
    let batch = engine.regrade_usages(&ids, dry_run).await;

    match format.as_str() {
        "json" => {
            let reports: Vec<serde_json::Value> = batch
                .reports
                .iter()
                .map(|(id, report)| serde_json::json!({ "usage": id, "report": report }))
                .collect();
            let output = serde_json::json!({
                "dry_run": dry_run,
                "reports": reports,
                "failed": batch.failed.iter().map(|(id, e)| serde_json::json!({ "usage": id, "error": e })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_report(&batch, dry_run),
    }

    if !batch.failed.is_empty() {
        anyhow::bail!("{} usage(s) failed to regrade", batch.failed.len());
    }
    Ok(())
}

fn print_report(batch: &BatchRegrade, dry_run: bool) {
    let mut table = Table::new();
    table.set_header(vec![
        "Usage", "Slot", "Question", "Old state", "New state", "Old mark", "New mark",
    ]);

    let mut changed = 0;
    let mut unchanged = 0;
    for (id, report) in &batch.reports {
        for outcome in &report.outcomes {
            if !outcome.changed {
                unchanged += 1;
                continue;
            }
            changed += 1;
            table.add_row(vec![
                Cell::new(id),
                Cell::new(outcome.slot),
                Cell::new(&outcome.question_id),
                Cell::new(outcome.old_state),
                Cell::new(outcome.new_state),
                Cell::new(format_mark(outcome.old_fraction.map(|f| f * outcome.old_max_mark))),
                Cell::new(format_mark(outcome.new_fraction.map(|f| f * outcome.new_max_mark))),
            ]);
        }
        for failure in &report.failures {
            println!(
                "  [{id}] slot {} ({}) FAILED: {}",
                failure.slot, failure.question_id, failure.error
            );
        }
    }

    if changed > 0 {
        println!("{table}");
    }
    let verb = if dry_run { "would change" } else { "changed" };
    println!("Regrade: {changed} slot(s) {verb}, {unchanged} unchanged");

    for (id, error) in &batch.failed {
        eprintln!("  ERROR: {id}: {error}");
    }
}
