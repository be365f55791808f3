use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AppState, Error, Result};

/// Overrides the data directory (default `~/.bakebox/`).
pub const HOME_ENV: &str = "BAKEBOX_HOME";
/// Overrides the stored image API key without persisting it.
pub const API_KEY_ENV: &str = "BAKEBOX_IMAGE_API_KEY";

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_IMAGE_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const STATE_FILE: &str = "state.json";
const SETTINGS_FILE: &str = "settings.json";

/// Resolve the data directory: `$BAKEBOX_HOME`, else `~/.bakebox/`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bakebox")
}

/// Write through a temp file and rename, so readers never see a half-written blob.
pub fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(Error::io(dir))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bakebox".to_string());
    let tmp = dir.join(format!(".{name}.tmp"));
    fs::write(&tmp, data).map_err(Error::io(&tmp))?;
    fs::rename(&tmp, path).map_err(Error::io(path))
}

/// Write a pretty-printed backup of the whole state.
pub fn write_backup(path: &Path, state: &AppState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(path, &json)
}

/// Read a backup file, repairing invariants on the way in.
pub fn read_backup(path: &Path) -> Result<AppState> {
    let raw = fs::read_to_string(path).map_err(Error::io(path))?;
    let mut state: AppState = serde_json::from_str(&raw)?;
    state.normalize();
    Ok(state)
}

// --- Image API settings ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_IMAGE_ENDPOINT.to_string()
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            endpoint: default_endpoint(),
        }
    }
}

impl ImageSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.model.is_empty() && !self.endpoint.is_empty()
    }

    /// Apply `$BAKEBOX_IMAGE_API_KEY`, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = key.trim().to_string();
            }
        }
        self
    }
}

// --- Store ---

/// Blob store rooted at one directory: the state file plus settings.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn open_default() -> Self {
        Self::new(data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Load the state blob. A missing file is an empty state.
    pub fn load_state(&self) -> Result<AppState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no state file, starting empty");
            return Ok(AppState::default());
        }
        let raw = fs::read_to_string(&path).map_err(Error::io(&path))?;
        let mut state: AppState = serde_json::from_str(&raw)?;
        state.normalize();
        Ok(state)
    }

    pub fn save_state(&self, state: &AppState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        write_atomic(&self.state_path(), &json)?;
        tracing::debug!(
            recipes = state.recipes.len(),
            categories = state.categories.len(),
            knowledge = state.knowledge.len(),
            "state saved"
        );
        Ok(())
    }

    /// Stored settings, or defaults when missing or unreadable.
    pub fn read_settings(&self) -> ImageSettings {
        let path = self.root.join(SETTINGS_FILE);
        if !path.exists() {
            return ImageSettings::default();
        }
        fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| {
                tracing::warn!(path = %path.display(), "unreadable settings, using defaults");
                ImageSettings::default()
            })
    }

    pub fn write_settings(&self, settings: &ImageSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;
        write_atomic(&self.root.join(SETTINGS_FILE), &json)
    }
}
