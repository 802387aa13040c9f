//! TOML question bank and scenario parser.
//!
//! Loads question banks from TOML files and directories, validates them,
//! and reads scenario files that drive a usage through a list of actions.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::behaviour::BehaviourKind;
use crate::question::{QuestionConfig, QuestionDefinition};

// ---------------------------------------------------------------------------
// Question banks
// ---------------------------------------------------------------------------

/// Intermediate TOML structure for bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    #[serde(default)]
    bank: Option<TomlBankHeader>,
    #[serde(default)]
    questions: Vec<QuestionConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    name: String,
    #[serde(default)]
    description: String,
}

/// The questions of one bank file.
#[derive(Debug, Clone)]
pub struct QuestionBankFile {
    pub name: String,
    pub description: String,
    pub source: PathBuf,
    pub questions: Vec<QuestionConfig>,
}

/// Parse a single bank file.
pub fn parse_bank(path: &Path) -> Result<QuestionBankFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_bank_str(&content, path)
}

/// Parse bank TOML from a string (useful for testing).
pub fn parse_bank_str(content: &str, source_path: &Path) -> Result<QuestionBankFile> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let (name, description) = match parsed.bank {
        Some(header) => (header.name, header.description),
        None => (
            source_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            String::new(),
        ),
    };

    Ok(QuestionBankFile {
        name,
        description,
        source: source_path.to_path_buf(),
        questions: parsed.questions,
    })
}

/// Recursively load all `.toml` bank files from a directory. Files that do
/// not parse are skipped with a warning.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBankFile>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a bank file, or every bank file under a directory.
pub fn load_bank_path(path: &Path) -> Result<Vec<QuestionBankFile>> {
    if path.is_dir() {
        load_bank_directory(path)
    } else {
        Ok(vec![parse_bank(path)?])
    }
}

/// A warning from bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate questions for common authoring mistakes.
pub fn validate_bank(questions: &[QuestionConfig]) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |id: &str, message: String| ValidationWarning {
        question_id: Some(id.to_string()),
        message,
    };

    let mut seen_ids = HashSet::new();
    for question in questions {
        if !seen_ids.insert(question.id()) {
            warnings.push(warn(question.id(), format!("duplicate question ID: {}", question.id())));
        }
    }

    for question in questions {
        let id = question.id();
        let definition = question.definition();

        if definition.default_mark() <= 0.0 {
            warnings.push(warn(id, "default_mark is not positive".into()));
        }
        if !(0.0..=1.0).contains(&definition.penalty()) {
            warnings.push(warn(id, "penalty should be between 0 and 1".into()));
        }

        match question {
            QuestionConfig::MultiChoice(mc) => {
                if mc.choices.len() < 2 {
                    warnings.push(warn(id, "fewer than two choices".into()));
                }
                if !mc.choices.iter().any(|c| (c.fraction - 1.0).abs() < 1e-7) {
                    warnings.push(warn(id, "no choice has fraction 1".into()));
                }
                if mc.choices.iter().any(|c| c.fraction > 1.0 || c.fraction < -1.0) {
                    warnings.push(warn(id, "choice fraction outside [-1, 1]".into()));
                }
            }
            QuestionConfig::Matching(m) => {
                if m.stems.len() < 2 {
                    warnings.push(warn(id, "fewer than two stems".into()));
                }
                if m.distractors.iter().any(|d| m.stems.iter().any(|s| &s.answer == d)) {
                    warnings.push(warn(id, "a distractor is also a right answer".into()));
                }
            }
            QuestionConfig::TrueFalse(_) | QuestionConfig::Essay(_) => {}
        }
    }

    warnings
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlScenarioFile {
    usage: TomlScenarioUsage,
    #[serde(default)]
    questions: Vec<QuestionConfig>,
    #[serde(default)]
    slots: Vec<ScenarioSlot>,
    #[serde(default)]
    actions: Vec<ScenarioAction>,
}

#[derive(Debug, Deserialize)]
struct TomlScenarioUsage {
    #[serde(default = "default_context")]
    context: String,
    #[serde(default)]
    behaviour: Option<String>,
    #[serde(default)]
    bank: Option<PathBuf>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    finish_all: bool,
}

fn default_context() -> String {
    "scenario".to_string()
}

/// A question placed in a scenario slot.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSlot {
    pub question: String,
    #[serde(default)]
    pub max_mark: Option<f64>,
}

/// One scripted action against a slot.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioAction {
    pub slot: usize,
    /// Raw step data (response fields and `-` behaviour variables).
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub finish: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub mark: Option<f64>,
    #[serde(default)]
    pub user: Option<String>,
}

/// A scripted run of one usage.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub context: String,
    /// `None` means the configured default.
    pub behaviour: Option<BehaviourKind>,
    /// Bank path, resolved against the scenario file's directory.
    pub bank: Option<PathBuf>,
    pub user: Option<String>,
    pub finish_all: bool,
    /// Questions defined inline in the scenario.
    pub questions: Vec<QuestionConfig>,
    pub slots: Vec<ScenarioSlot>,
    pub actions: Vec<ScenarioAction>,
}

/// Parse a scenario file.
pub fn parse_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario: {}", path.display()))?;

    parse_scenario_str(&content, path)
}

/// Parse scenario TOML from a string.
pub fn parse_scenario_str(content: &str, source_path: &Path) -> Result<Scenario> {
    let parsed: TomlScenarioFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let behaviour = parsed
        .usage
        .behaviour
        .map(|b| b.parse::<BehaviourKind>())
        .transpose()?;

    let base = source_path.parent().unwrap_or_else(|| Path::new("."));
    let bank = parsed.usage.bank.map(|b| if b.is_absolute() { b } else { base.join(b) });

    if parsed.slots.is_empty() {
        anyhow::bail!("scenario {} has no slots", source_path.display());
    }
    for action in &parsed.actions {
        if action.slot == 0 || action.slot > parsed.slots.len() {
            anyhow::bail!(
                "action refers to slot {} but the scenario has {} slots",
                action.slot,
                parsed.slots.len()
            );
        }
    }

    Ok(Scenario {
        context: parsed.usage.context,
        behaviour,
        bank,
        user: parsed.usage.user,
        finish_all: parsed.usage.finish_all,
        questions: parsed.questions,
        slots: parsed.slots,
        actions: parsed.actions,
    })
}
