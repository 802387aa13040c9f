//! The `qattempt run` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use qattempt_core::behaviour::{ActionOutcome, FINISH};
use qattempt_core::display::{AttemptView, DisplayOptions};
use qattempt_core::engine::{QuestionEngine, SlotSpec};
use qattempt_core::parser::{self, ScenarioAction};
use qattempt_core::step::{StepData, BEHAVIOUR_PREFIX};
use qattempt_core::traits::QuestionBank;
use qattempt_core::usage::Usage;
use qattempt_store::config::load_config_from;
use qattempt_store::{create_store, MemoryBank, TomlQuestionBank};

use super::format_mark;

#[derive(Serialize)]
struct RunSummary {
    usage_id: Uuid,
    context: String,
    store: String,
    total_mark: Option<f64>,
    max_total: f64,
    slots: Vec<AttemptView>,
}

pub async fn execute(
    scenario_path: PathBuf,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "text" | "json"),
        "unknown format '{format}', expected text or json"
    );

    let config = load_config_from(config_path.as_deref())?;
    tracing::debug!(?config, "configuration loaded");
    let scenario = parser::parse_scenario(&scenario_path)?;

    let bank: Arc<dyn QuestionBank> = match &scenario.bank {
        Some(path) => Arc::new(
            TomlQuestionBank::load(path)
                .with_context(|| format!("failed to load bank {}", path.display()))?
                .with_questions(scenario.questions.clone()),
        ),
        None => Arc::new(MemoryBank::from_configs(scenario.questions.clone())),
    };
    let store = create_store(&config.store);
    let store_name = store.name().to_string();
    let engine = QuestionEngine::new(store, bank, config.engine_config());

    let behaviour = scenario.behaviour.unwrap_or(config.default_behaviour);
    let slots: Vec<SlotSpec> = scenario
        .slots
        .iter()
        .map(|s| SlotSpec {
            question_id: s.question.clone(),
            max_mark: s.max_mark,
        })
        .collect();

    let mut usage = engine
        .create_usage(&scenario.context, behaviour, &slots, scenario.user.clone())
        .await?;
    eprintln!(
        "Usage {}: {} slot(s), behaviour {behaviour}",
        usage.id(),
        usage.len()
    );

    for (index, action) in scenario.actions.iter().enumerate() {
        let user = action.user.clone().or_else(|| scenario.user.clone());
        let outcome = apply_action(&engine, &mut usage, action, user)
            .await
            .with_context(|| format!("action {} on slot {} failed", index + 1, action.slot))?;
        let state = usage.attempt(action.slot)?.state();
        let verb = match outcome {
            ActionOutcome::Keep => "kept",
            ActionOutcome::Discard => "discarded",
        };
        eprintln!("  [{}] slot {}: {verb} ({state})", index + 1, action.slot);
    }

    if scenario.finish_all {
        engine
            .finish_all(&mut usage, scenario.user.clone())
            .await
            .context("failed to finish usage")?;
    }

    let views = usage
        .attempts()
        .iter()
        .map(|a| a.view(DisplayOptions::default()))
        .collect::<Result<Vec<_>, _>>()?;

    match format.as_str() {
        "json" => {
            let summary = RunSummary {
                usage_id: usage.id(),
                context: usage.context().to_string(),
                store: store_name,
                total_mark: usage.total_mark(),
                max_total: usage.max_total(),
                slots: views,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            print_summary(&usage, &views);
            eprintln!("Saved usage {} to the {store_name} store", usage.id());
        }
    }

    Ok(())
}

async fn apply_action(
    engine: &QuestionEngine,
    usage: &mut Usage,
    action: &ScenarioAction,
    user: Option<String>,
) -> Result<ActionOutcome> {
    if action.comment.is_some() || action.mark.is_some() {
        let comment = action.comment.as_deref().unwrap_or_default();
        return engine
            .manual_grade(usage, action.slot, comment, action.mark, user)
            .await;
    }

    let mut data: StepData = action.data.clone();
    if action.finish {
        data.insert(format!("{BEHAVIOUR_PREFIX}{FINISH}"), "1".to_string());
    }
    engine.process_action(usage, action.slot, data, user).await
}

fn print_summary(usage: &Usage, views: &[AttemptView]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Slot", "Question", "Behaviour", "State", "Mark", "Max", "Response",
    ]);

    for view in views {
        table.add_row(vec![
            Cell::new(view.slot),
            Cell::new(&view.question_id),
            Cell::new(view.behaviour),
            Cell::new(view.state),
            Cell::new(format_mark(view.mark)),
            Cell::new(format!("{:.2}", view.max_mark)),
            Cell::new(view.response_summary.as_deref().unwrap_or("-")),
        ]);
    }

    println!("{table}");
    println!(
        "Total: {} / {:.2}",
        usage
            .total_mark()
            .map_or_else(|| "needs grading".to_string(), |t| format!("{t:.2}")),
        usage.max_total()
    );
}
