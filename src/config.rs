//! Configuration stored in ~/.dealscore/config.json, plus the thesis and
//! criteria files it points at.
//!
//! The thesis markdown and rubric are read once into an immutable
//! [`LoadedConfig`] snapshot. Scorers and classifiers receive an
//! `Arc<LoadedConfig>` at call time; [`ConfigStore::reload`] swaps in a fresh
//! snapshot without disturbing calls already holding the old one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::criteria::{parse_criteria, DiligenceCriteria};
use crate::error::DiligenceError;
use crate::hubspot::RetryPolicy;
use crate::types::ScoringSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiligenceConfig {
    /// Investment thesis markdown. Relative paths resolve against the config directory.
    #[serde(default = "default_thesis_path")]
    pub thesis_path: String,
    /// Criteria rubric JSON export.
    #[serde(default = "default_criteria_path")]
    pub criteria_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    #[serde(default)]
    pub scoring: ScoringSettings,
    /// Questions every founder is asked; fed to the scorer and the narrative.
    #[serde(default)]
    pub founder_questions: Vec<String>,
    #[serde(default = "default_max_document_warnings")]
    pub max_document_warnings: usize,
    #[serde(default)]
    pub hubspot: HubSpotConfig,
}

impl Default for DiligenceConfig {
    fn default() -> Self {
        Self {
            thesis_path: default_thesis_path(),
            criteria_path: default_criteria_path(),
            database_path: None,
            scoring: ScoringSettings::default(),
            founder_questions: Vec::new(),
            max_document_warnings: default_max_document_warnings(),
            hubspot: HubSpotConfig::default(),
        }
    }
}

fn default_thesis_path() -> String {
    "thesis.md".to_string()
}

fn default_criteria_path() -> String {
    "criteria.json".to_string()
}

fn default_max_document_warnings() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSpotConfig {
    #[serde(default = "default_hubspot_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the private-app token.
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_pipeline_id")]
    pub pipeline_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_stage_id: Option<String>,
    /// Push to HubSpot at the end of every successful re-score.
    #[serde(default)]
    pub sync_on_rescore: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            base_url: default_hubspot_base_url(),
            access_token_env: default_access_token_env(),
            pipeline_id: default_pipeline_id(),
            deal_stage_id: None,
            sync_on_rescore: false,
            retry: RetryPolicy::default(),
        }
    }
}

fn default_hubspot_base_url() -> String {
    "https://api.hubapi.com".to_string()
}

fn default_access_token_env() -> String {
    "HUBSPOT_ACCESS_TOKEN".to_string()
}

fn default_pipeline_id() -> String {
    "default".to_string()
}

/// Default config location: `~/.dealscore/config.json`.
pub fn config_path() -> Result<PathBuf, DiligenceError> {
    let home = dirs::home_dir().ok_or_else(|| {
        DiligenceError::ConfigurationError("Could not find home directory".into())
    })?;
    Ok(home.join(".dealscore").join("config.json"))
}

/// Read and parse a config file.
pub fn load_config_file(path: &Path) -> Result<DiligenceConfig, DiligenceError> {
    if !path.exists() {
        return Err(DiligenceError::ConfigurationError(format!(
            "Config file not found at {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path)
        .map_err(|e| DiligenceError::ConfigurationError(format!("Failed to read config: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| DiligenceError::ConfigurationError(format!("Failed to parse config: {}", e)))
}

fn resolve_relative(base_dir: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Read-only view of the active configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DiligenceConfig,
    pub thesis_markdown: String,
    pub criteria: DiligenceCriteria,
    pub loaded_at: DateTime<Utc>,
}

impl LoadedConfig {
    /// Load a config file and the thesis/criteria files it references.
    pub fn from_file(path: &Path) -> Result<Self, DiligenceError> {
        let config = load_config_file(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let thesis_path = resolve_relative(base_dir, &config.thesis_path);
        let thesis_markdown = fs::read_to_string(&thesis_path).map_err(|e| {
            DiligenceError::ConfigurationError(format!(
                "Failed to read thesis {}: {}",
                thesis_path.display(),
                e
            ))
        })?;

        let criteria_path = resolve_relative(base_dir, &config.criteria_path);
        let criteria_json = fs::read_to_string(&criteria_path).map_err(|e| {
            DiligenceError::ConfigurationError(format!(
                "Failed to read criteria {}: {}",
                criteria_path.display(),
                e
            ))
        })?;
        let criteria = parse_criteria(&criteria_json)?;

        Ok(Self {
            config,
            thesis_markdown,
            criteria,
            loaded_at: Utc::now(),
        })
    }
}

/// Holds the current configuration snapshot and reloads it on demand.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<LoadedConfig>>,
}

impl ConfigStore {
    /// Load from the default location.
    pub fn load() -> Result<Self, DiligenceError> {
        Self::load_from(config_path()?)
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, DiligenceError> {
        let path = path.into();
        let loaded = LoadedConfig::from_file(&path)?;
        log::info!(
            "config: loaded {} criteria categories from {}",
            loaded.criteria.categories.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(loaded)),
        })
    }

    /// Build a store from already-loaded parts. Such a store cannot reload.
    pub fn from_parts(
        config: DiligenceConfig,
        thesis_markdown: impl Into<String>,
        criteria: DiligenceCriteria,
    ) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(LoadedConfig {
                config,
                thesis_markdown: thesis_markdown.into(),
                criteria,
                loaded_at: Utc::now(),
            })),
        }
    }

    pub fn snapshot(&self) -> Arc<LoadedConfig> {
        self.current.read().clone()
    }

    /// Re-read config, thesis, and criteria from disk. On failure the
    /// previous snapshot stays active.
    pub fn reload(&self) -> Result<Arc<LoadedConfig>, DiligenceError> {
        let Some(path) = self.path.as_ref() else {
            return Err(DiligenceError::ConfigurationError(
                "Config store was not loaded from a file".into(),
            ));
        };
        match LoadedConfig::from_file(path) {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                *self.current.write() = loaded.clone();
                log::info!("config: reloaded from {}", path.display());
                Ok(loaded)
            }
            Err(e) => {
                log::warn!("config: reload failed, keeping previous snapshot: {}", e);
                Err(e)
            }
        }
    }
}
