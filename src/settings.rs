use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::note::SortBy;
use crate::theme::Theme;

pub const SETTINGS_FILE: &str = "settings.json";

// App settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Where storage files live. Defaults to the app data directory.
    pub data_dir: Option<String>,
    pub default_sort: SortBy,
    pub default_theme: Theme,
    pub test_note_count: usize,
    pub page_size: usize,
    pub storage_quota_bytes: Option<usize>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            default_sort: SortBy::Newest,
            default_theme: Theme::Light,
            test_note_count: 10,
            page_size: 20,
            storage_quota_bytes: None,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Storage directory: the configured one, or `fallback`.
    pub fn storage_dir(&self, fallback: &Path) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

// Load settings from disk
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }

    match std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))
        .and_then(|content| serde_json::from_str::<Settings>(&content).context("parsing settings"))
    {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "using default settings");
            Settings::default()
        }
    }
}

// Save settings to disk
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
