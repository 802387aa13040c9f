//! The `qattempt show` and `qattempt list` commands.
//!
//! Both read the store directly, so they work without the question bank.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use uuid::Uuid;

use qattempt_store::config::load_config_from;
use qattempt_store::create_store;

use super::format_mark;

pub async fn execute(id: Uuid, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = create_store(&config.store);

    let record = store.load_usage(id).await?;
    println!(
        "Usage {} ({}), preferred behaviour {}, created {}",
        record.id,
        record.context,
        record.preferred_behaviour,
        record.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    for slot in &record.slots {
        let steps = store
            .load_steps(id, slot.slot)
            .await
            .with_context(|| format!("failed to load slot {}", slot.slot))?;
        println!(
            "\nSlot {}: {} [{}] max mark {:.2}",
            slot.slot, slot.question_id, slot.behaviour, slot.max_mark
        );

        let mut table = Table::new();
        table.set_header(vec!["Seq", "State", "Fraction", "Mark", "User", "Time", "Data"]);
        for step in &steps {
            let data = step
                .data()
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![
                Cell::new(step.sequence()),
                Cell::new(step.state()),
                Cell::new(format_mark(step.fraction())),
                Cell::new(format_mark(step.fraction().map(|f| f * slot.max_mark))),
                Cell::new(step.user_id().unwrap_or("-")),
                Cell::new(step.timestamp().format("%H:%M:%S")),
                Cell::new(data),
            ]);
        }
        println!("{table}");
    }

    Ok(())
}

pub async fn list(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = create_store(&config.store);
    let records = store.list_usages().await?;

    if records.is_empty() {
        println!("No stored usages.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Usage", "Context", "Behaviour", "Slots", "Created"]);
    for record in &records {
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(&record.context),
            Cell::new(record.preferred_behaviour),
            Cell::new(record.slots.len()),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    println!("{table}");

    Ok(())
}
