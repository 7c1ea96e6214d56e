//! Persistent instance store backed by `config.toml`.
//!
//! The file maps instance names to [`InstanceConfig`] records and remembers
//! which one is current. Loading is forgiving: a missing file is created, a
//! partial file is repaired, and an unreadable file falls back to defaults in
//! memory so the launcher can still start.
//!
//! # Example
//!
//! ```rust,ignore
//! use maibot_core::store::ConfigStore;
//!
//! let mut store = ConfigStore::load("config.toml")?;
//! let serial = store.generate_unique_serial();
//! println!("next absolute serial: {}", serial);
//! store.save()?;
//! ```

use crate::config::AppConfig;
use crate::error::{LauncherError, Result};
use crate::models::{ConfigDocument, InstanceConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Lenient on-disk shape used to repair partial documents.
#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    current_config: Option<String>,
    configurations: Option<BTreeMap<String, InstanceConfig>>,
}

/// Instance store bound to a file path.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    document: ConfigDocument,
    load_error: Option<String>,
}

impl ConfigStore {
    /// Load the store, creating or repairing the file as needed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!("Config file {} not found, writing defaults", path.display());
            let store = Self {
                path,
                document: ConfigDocument::default(),
                load_error: None,
            };
            store.save()?;
            return Ok(store);
        }

        let contents =
            fs::read_to_string(&path).map_err(|e| LauncherError::io_with_path(e, &path))?;

        match toml::from_str::<RawDocument>(&contents) {
            Ok(raw) => {
                let (document, repaired) = Self::repair(raw);
                let store = Self {
                    path,
                    document,
                    load_error: None,
                };
                if repaired {
                    warn!("Config file {} was incomplete, repaired", store.path.display());
                    store.save()?;
                }
                Ok(store)
            }
            Err(e) => {
                error!("Failed to parse {}: {}", path.display(), e);
                Ok(Self {
                    path,
                    document: ConfigDocument::default(),
                    load_error: Some(e.to_string()),
                })
            }
        }
    }

    /// Build an in-memory store without touching disk.
    pub fn from_document(path: impl Into<PathBuf>, document: ConfigDocument) -> Self {
        Self {
            path: path.into(),
            document,
            load_error: None,
        }
    }

    fn repair(raw: RawDocument) -> (ConfigDocument, bool) {
        let mut repaired = false;

        let configurations = match raw.configurations {
            Some(configs) => configs,
            None => {
                repaired = true;
                ConfigDocument::default().configurations
            }
        };

        let current_config = match raw.current_config {
            Some(name) if configurations.contains_key(&name) => name,
            _ => {
                repaired = true;
                configurations
                    .keys()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| AppConfig::DEFAULT_CONFIG_NAME.to_string())
            }
        };

        let mut document = ConfigDocument {
            current_config,
            configurations,
        };
        if document.configurations.is_empty() {
            repaired = true;
            document = ConfigDocument::default();
        }
        (document, repaired)
    }

    /// Write the document as pretty TOML via a temp file and rename.
    ///
    /// Fails while a load error is pending: the in-memory document is then
    /// only a fallback and must not replace the file on disk.
    pub fn save(&self) -> Result<()> {
        if let Some(message) = &self.load_error {
            warn!("Not saving {}: file could not be parsed", self.path.display());
            return Err(LauncherError::ConfigUnreadable {
                path: self.path.clone(),
                message: message.clone(),
            });
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
            }
        }

        let serialized = toml::to_string_pretty(&self.document)?;
        let temp_path = self
            .path
            .with_extension(format!("toml.{}.tmp", std::process::id()));

        fs::write(&temp_path, serialized).map_err(|e| LauncherError::io_with_path(e, &temp_path))?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            LauncherError::io_with_path(e, &self.path)
        })?;

        debug!("Saved {} configurations to {}", self.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse error from the last load, if the file was unreadable.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn len(&self) -> usize {
        self.document.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.configurations.is_empty()
    }

    pub fn current_name(&self) -> &str {
        &self.document.current_config
    }

    pub fn current(&self) -> Option<&InstanceConfig> {
        self.document.configurations.get(&self.document.current_config)
    }

    pub fn set_current(&mut self, name: &str) -> Result<()> {
        if !self.contains(name) {
            return Err(LauncherError::ConfigNotFound {
                name: name.to_string(),
            });
        }
        self.document.current_config = name.to_string();
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.document.configurations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&InstanceConfig> {
        self.document.configurations.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut InstanceConfig> {
        self.document.configurations.get_mut(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.document.configurations.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InstanceConfig)> {
        self.document.configurations.iter()
    }

    /// Insert a new record, assigning a unique absolute serial.
    pub fn add(&mut self, name: &str, mut instance: InstanceConfig) -> Result<u32> {
        if self.contains(name) {
            return Err(LauncherError::DuplicateConfig {
                name: name.to_string(),
            });
        }

        if instance.absolute_serial_number == 0
            || self.absolute_serial_in_use(instance.absolute_serial_number)
        {
            instance.absolute_serial_number = self.generate_unique_serial();
        }

        let serial = instance.absolute_serial_number;
        info!(
            "Adding configuration {} (serial {}, absolute {})",
            name, instance.serial_number, serial
        );
        self.document
            .configurations
            .insert(name.to_string(), instance);
        Ok(serial)
    }

    /// Replace an existing record.
    pub fn update(&mut self, name: &str, instance: InstanceConfig) -> Result<()> {
        match self.document.configurations.get_mut(name) {
            Some(slot) => {
                *slot = instance;
                Ok(())
            }
            None => Err(LauncherError::ConfigNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Remove a record, keeping `current_config` pointing at something valid.
    pub fn remove(&mut self, name: &str) -> Result<InstanceConfig> {
        let removed = self
            .document
            .configurations
            .remove(name)
            .ok_or_else(|| LauncherError::ConfigNotFound {
                name: name.to_string(),
            })?;

        if self.document.configurations.is_empty() {
            info!("Last configuration removed, recreating default");
            self.document = ConfigDocument::default();
        } else if self.document.current_config == name {
            if let Some(first) = self.document.configurations.keys().next() {
                self.document.current_config = first.clone();
            }
        }

        Ok(removed)
    }

    /// Look up a record by user serial or absolute serial.
    pub fn find_by_serial(&self, serial: &str) -> Option<(&str, &InstanceConfig)> {
        let serial = serial.trim();
        if serial.is_empty() {
            return None;
        }
        self.document
            .configurations
            .iter()
            .find(|(_, cfg)| {
                cfg.serial_number == serial || cfg.absolute_serial_number.to_string() == serial
            })
            .map(|(name, cfg)| (name.as_str(), cfg))
    }

    /// Remove every record matching one of the serials. Returns removed names.
    pub fn remove_by_serials(&mut self, serials: &[String]) -> Vec<String> {
        let names: Vec<String> = serials
            .iter()
            .filter_map(|serial| self.find_by_serial(serial).map(|(name, _)| name.to_string()))
            .collect();

        let mut removed = Vec::new();
        for name in names {
            if self.remove(&name).is_ok() {
                removed.push(name);
            }
        }
        removed
    }

    /// Whether a user-facing serial is already taken.
    pub fn serial_in_use(&self, serial: &str) -> bool {
        self.document
            .configurations
            .values()
            .any(|cfg| cfg.serial_number == serial.trim())
    }

    fn absolute_serial_in_use(&self, serial: u32) -> bool {
        self.document
            .configurations
            .values()
            .any(|cfg| cfg.absolute_serial_number == serial)
    }

    /// Smallest positive absolute serial not used by any record.
    pub fn generate_unique_serial(&self) -> u32 {
        let mut candidate = 1;
        while self.absolute_serial_in_use(candidate) {
            candidate += 1;
        }
        candidate
    }
}
