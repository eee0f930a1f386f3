//! Seeder configuration
//!
//! Loaded from a JSON file (`--config`, or `config.json` in the user config
//! directory), every field optional. CLI flags are applied on top.

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Locale;

const APP_NAME: &str = "guildbank-item-seeder";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeederConfig {
    /// SQLite database holding the `item` table
    pub database: Option<PathBuf>,
    pub source: SourceConfig,
    pub import: ImportConfig,
    pub update: UpdateConfig,
    pub backfill: BackfillConfig,
}

/// Where items are fetched from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub scheme: String,
    pub host: String,
    pub catalog_path: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: "wowhead.com".to_string(),
            catalog_path: "classic".to_string(),
            user_agent: APP_NAME.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// First id of the contiguous range
    pub first_id: i64,
    /// Last id of the contiguous range (inclusive)
    pub last_id: i64,
    /// Only ids below this count towards the resume cursor
    pub primary_ceiling: i64,
    /// Known ids outside the contiguous range
    pub special_ids: Vec<i64>,
    pub workers: usize,
    /// Ids a worker processes between commits
    pub commit_every: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            first_id: 1,
            last_id: 35948,
            primary_ceiling: 100_000,
            // Chronoboon Displacer and Supercharged Chronoboon Displacer
            special_ids: vec![184937, 184938],
            workers: 5,
            commit_every: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub page_size: usize,
    pub workers: usize,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            workers: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub locales: Vec<Locale>,
    /// Locale whose missing name marks the backfill frontier; defaults to the last of `locales`
    pub marker: Option<Locale>,
    pub page_size: usize,
    pub workers: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            locales: Locale::all().collect(),
            marker: None,
            page_size: 1000,
            workers: 5,
        }
    }
}

impl BackfillConfig {
    pub fn marker_locale(&self) -> Option<Locale> {
        self.marker.or_else(|| self.locales.last().copied())
    }
}

impl SeederConfig {
    /// Load from an explicit path, the default config file, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        Ok(config)
    }

    /// Database path, defaulting to `catalog.db` in the user data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database {
            return Ok(path.clone());
        }

        let dir = data_dir()?;
        fs::create_dir_all(&dir).context("Failed to create data directory")?;
        Ok(dir.join("catalog.db"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.workers == 0 || self.update.workers == 0 || self.backfill.workers == 0 {
            bail!("Worker count must be at least 1");
        }
        if self.import.commit_every == 0 {
            bail!("commit_every must be at least 1");
        }
        if self.update.page_size == 0 || self.backfill.page_size == 0 {
            bail!("page_size must be at least 1");
        }
        if self.import.first_id > self.import.last_id {
            bail!(
                "first_id ({}) is greater than last_id ({})",
                self.import.first_id,
                self.import.last_id
            );
        }
        if self.backfill.locales.is_empty() {
            bail!("No backfill locales configured");
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
}

pub fn data_dir() -> Result<PathBuf> {
    let dirs = project_dirs().context("Could not determine data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
