//! Configuration loading and store factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use qattempt_core::behaviour::BehaviourKind;
use qattempt_core::engine::EngineConfig;
use qattempt_core::traits::AttemptStore;

use crate::json_file::JsonFileStore;
use crate::memory::MemoryStore;

/// Where usages and their steps are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Json {
        #[serde(default = "default_store_dir")]
        dir: PathBuf,
    },
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Json {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./.qattempt/usages")
}

/// Top-level qattempt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QattemptConfig {
    /// Behaviour for usages whose scenario names none.
    #[serde(default = "default_behaviour")]
    pub default_behaviour: BehaviourKind,
    /// Report negative CBM marks as zero in totals.
    #[serde(default)]
    pub clamp_negative_marks: bool,
    /// Max usages regraded concurrently.
    #[serde(default = "default_parallelism")]
    pub regrade_parallelism: usize,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_behaviour() -> BehaviourKind {
    BehaviourKind::DeferredFeedback
}
fn default_parallelism() -> usize {
    4
}

impl Default for QattemptConfig {
    fn default() -> Self {
        Self {
            default_behaviour: default_behaviour(),
            clamp_negative_marks: false,
            regrade_parallelism: default_parallelism(),
            store: StoreConfig::default(),
        }
    }
}

impl QattemptConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            clamp_negative_marks: self.clamp_negative_marks,
            regrade_parallelism: self.regrade_parallelism,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `qattempt.toml` in the current directory
/// 2. `~/.config/qattempt/config.toml`
///
/// `QATTEMPT_STORE_DIR` overrides the store with a JSON store in that
/// directory.
pub fn load_config() -> Result<QattemptConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QattemptConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("qattempt.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QattemptConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QattemptConfig::default(),
    };

    if let Ok(dir) = std::env::var("QATTEMPT_STORE_DIR") {
        config.store = StoreConfig::Json {
            dir: PathBuf::from(dir),
        };
    }

    if let StoreConfig::Json { dir } = &config.store {
        config.store = StoreConfig::Json {
            dir: PathBuf::from(resolve_env_vars(&dir.to_string_lossy())),
        };
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("qattempt"))
}

/// Create a store instance from its configuration.
pub fn create_store(config: &StoreConfig) -> Arc<dyn AttemptStore> {
    match config {
        StoreConfig::Json { dir } => Arc::new(JsonFileStore::new(dir.clone())),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    }
}
