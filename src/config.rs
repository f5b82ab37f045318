use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::autosave::DEFAULT_AUTOSAVE_DELAY;
use crate::watcher::DEFAULT_WATCH_DEBOUNCE;

const APP_DIR: &str = "game-hub";

/// User-tunable settings, read from `<config dir>/game-hub/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubConfig {
    pub autosave_delay_ms: u64,
    pub watch_debounce_ms: u64,
    /// Folder shown in the file explorer and watched for outside changes.
    pub workspace_root: Option<PathBuf>,
    /// Where view sessions and layout are remembered between runs.
    pub state_file: Option<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            autosave_delay_ms: DEFAULT_AUTOSAVE_DELAY.as_millis() as u64,
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE.as_millis() as u64,
            workspace_root: None,
            state_file: None,
        }
    }
}

impl HubConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
    }

    /// Load from the default location. A missing file means defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// A missing file yields defaults; a file that exists but can't be read
    /// or parsed is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    /// The state file, falling back to `<data dir>/game-hub/state.json`.
    /// `None` means nowhere to persist; state then lives in memory only.
    pub fn state_file(&self) -> Option<PathBuf> {
        self.state_file
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR).join("state.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = HubConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.autosave_delay(), Duration::from_millis(2000));
        assert_eq!(config.watch_debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"autosaveDelayMs": 750, "workspaceRoot": "/games"}"#).unwrap();

        let config = HubConfig::load_from(&path).unwrap();
        assert_eq!(config.autosave_delay_ms, 750);
        assert_eq!(config.watch_debounce_ms, 500);
        assert_eq!(config.workspace_root, Some(PathBuf::from("/games")));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = HubConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = HubConfig {
            state_file: Some(dir.path().join("state.json")),
            ..HubConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(HubConfig::load_from(&path).unwrap(), config);
        assert_eq!(config.state_file(), Some(dir.path().join("state.json")));
    }
}
