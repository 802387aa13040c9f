//! Question bank adapters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use qattempt_core::parser::load_bank_path;
use qattempt_core::question::{QuestionConfig, QuestionDefinition};
use qattempt_core::traits::QuestionBank;

use crate::error::StoreError;

/// Questions held in a map, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct MemoryBank {
    questions: HashMap<String, Arc<dyn QuestionDefinition>>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parsed configs. A later question replaces an earlier one
    /// with the same id.
    pub fn from_configs(configs: impl IntoIterator<Item = QuestionConfig>) -> Self {
        let mut bank = Self::new();
        for config in configs {
            bank.insert(config.build());
        }
        bank
    }

    /// Add or replace a question.
    pub fn insert(&mut self, question: Arc<dyn QuestionDefinition>) {
        if let Some(old) = self.questions.insert(question.id().to_string(), question) {
            tracing::warn!("question '{}' defined more than once, last one wins", old.id());
        }
    }

    pub fn with_question(mut self, question: Arc<dyn QuestionDefinition>) -> Self {
        self.insert(question);
        self
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn QuestionDefinition>> {
        self.questions.get(id)
    }
}

#[async_trait]
impl QuestionBank for MemoryBank {
    async fn load_question(&self, id: &str) -> Result<Arc<dyn QuestionDefinition>> {
        self.get(id)
            .cloned()
            .ok_or_else(|| StoreError::QuestionNotFound(id.to_string()).into())
    }

    async fn question_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.questions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// A bank read from a TOML file or a directory of TOML files.
#[derive(Debug, Clone)]
pub struct TomlQuestionBank {
    source: PathBuf,
    questions: MemoryBank,
}

impl TomlQuestionBank {
    /// Read every question under `path` now. Files that fail to parse inside
    /// a directory are skipped; a single file that fails is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let files = load_bank_path(path)?;
        let questions = MemoryBank::from_configs(files.into_iter().flat_map(|f| f.questions));
        tracing::debug!(bank = %path.display(), questions = questions.len(), "question bank loaded");
        Ok(Self {
            source: path.to_path_buf(),
            questions,
        })
    }

    /// Extend the bank with extra questions (e.g. defined inline in a
    /// scenario). They replace bank questions with the same id.
    pub fn with_questions(mut self, configs: impl IntoIterator<Item = QuestionConfig>) -> Self {
        for config in configs {
            self.questions.insert(config.build());
        }
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[async_trait]
impl QuestionBank for TomlQuestionBank {
    async fn load_question(&self, id: &str) -> Result<Arc<dyn QuestionDefinition>> {
        self.questions.load_question(id).await
    }

    async fn question_ids(&self) -> Result<Vec<String>> {
        self.questions.question_ids().await
    }
}
