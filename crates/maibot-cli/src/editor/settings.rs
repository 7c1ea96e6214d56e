//! `.config_UI.json`: editor port and the instances created through the editor.

use anyhow::{Context, Result};
use maibot_core::{AppConfig, ConfigStore, InstanceConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An instance added through the web editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiInstance {
    pub name: String,
    #[serde(default)]
    pub absolute_serial_number: Option<u32>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub nickname_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub instances: Vec<UiInstance>,
    pub ui_settings: Map<String, Value>,
}

impl EditorSettings {
    /// The settings file sits next to the instance store.
    pub fn path_for(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(AppConfig::EDITOR_SETTINGS_FILE)
    }

    /// Missing file yields defaults. A malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No editor settings at {}", path.display());
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
    }

    /// `ui_settings.port`, accepting a number or a numeric string.
    pub fn port(&self) -> u16 {
        match self.ui_settings.get("port") {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .unwrap_or(AppConfig::EDITOR_DEFAULT_PORT)
    }

    /// Drop instances the store no longer has. Returns whether anything changed.
    pub fn sync_with(&mut self, store: &ConfigStore) -> bool {
        let before = self.instances.len();
        self.instances.retain(|entry| store.contains(&entry.name));
        let dropped = before - self.instances.len();
        if dropped > 0 {
            info!("Dropped {} stale editor instance entries", dropped);
        }
        dropped > 0
    }

    pub fn record(&mut self, name: &str, instance: &InstanceConfig) {
        self.forget(name);
        self.instances.push(UiInstance {
            name: name.to_string(),
            absolute_serial_number: Some(instance.absolute_serial_number),
            serial_number: Some(instance.serial_number.clone()),
            nickname_path: Some(instance.nickname_path.clone()),
        });
    }

    pub fn forget(&mut self, name: &str) -> bool {
        let before = self.instances.len();
        self.instances.retain(|entry| entry.name != name);
        self.instances.len() != before
    }

    pub fn tracks(&self, name: &str) -> bool {
        self.instances.iter().any(|entry| entry.name == name)
    }
}
