//! Instance records stored in `config.toml`.

use crate::config::AppConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Which optional components were selected when the instance was deployed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallOptions {
    pub install_adapter: bool,
    pub install_napcat: bool,
    pub install_mongodb: bool,
    pub install_webui: bool,
}

impl InstallOptions {
    /// Labelled view used by detail screens.
    pub fn entries(&self) -> [(&'static str, bool); 4] {
        [
            ("adapter", self.install_adapter),
            ("napcat", self.install_napcat),
            ("mongodb", self.install_mongodb),
            ("webui", self.install_webui),
        ]
    }

    pub fn selected_count(&self) -> u32 {
        self.entries().iter().filter(|(_, on)| *on).count() as u32
    }
}

/// One configured bot installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    #[serde(deserialize_with = "serial_from_any")]
    pub serial_number: String,
    #[serde(deserialize_with = "absolute_serial_from_any")]
    pub absolute_serial_number: u32,
    pub version_path: String,
    pub nickname_path: String,
    pub mai_path: String,
    pub adapter_path: String,
    pub napcat_path: String,
    pub mongodb_path: String,
    pub webui_path: String,
    pub venv_path: String,
    pub qq_account: String,
    pub install_options: InstallOptions,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            serial_number: "1".to_string(),
            absolute_serial_number: 1,
            version_path: AppConfig::DEFAULT_VERSION.to_string(),
            nickname_path: AppConfig::DEFAULT_NICKNAME.to_string(),
            mai_path: String::new(),
            adapter_path: String::new(),
            napcat_path: String::new(),
            mongodb_path: String::new(),
            webui_path: String::new(),
            venv_path: String::new(),
            qq_account: String::new(),
            install_options: InstallOptions::default(),
        }
    }
}

impl InstanceConfig {
    /// An empty record with the given serial and version.
    pub fn new(serial_number: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            absolute_serial_number: 0,
            version_path: version.into(),
            nickname_path: String::new(),
            ..Self::default()
        }
    }

    pub fn mai_dir(&self) -> &Path {
        Path::new(&self.mai_path)
    }

    /// Adapter directory, unless unset or marked as not applicable.
    pub fn adapter_dir(&self) -> Option<&Path> {
        if self.adapter_path.is_empty() || self.has_no_adapter_marker() {
            None
        } else {
            Some(Path::new(&self.adapter_path))
        }
    }

    pub fn has_no_adapter_marker(&self) -> bool {
        self.adapter_path == AppConfig::NO_ADAPTER_SENTINEL
    }

    pub fn napcat_exe(&self) -> Option<&Path> {
        non_empty_path(&self.napcat_path)
    }

    pub fn mongodb_dir(&self) -> Option<&Path> {
        non_empty_path(&self.mongodb_path)
    }

    pub fn webui_dir(&self) -> Option<&Path> {
        non_empty_path(&self.webui_path)
    }

    /// Virtual environment for the bot, if one can be located.
    pub fn venv_dir(&self) -> Option<PathBuf> {
        if let Some(venv) = non_empty_path(&self.venv_path) {
            if venv.exists() {
                return Some(venv.to_path_buf());
            }
        }
        if self.mai_path.is_empty() {
            return None;
        }
        ["venv", ".venv"]
            .iter()
            .map(|name| self.mai_dir().join(name))
            .find(|candidate| candidate.exists())
    }

    /// Display label: nickname, or the serial when no nickname is set.
    pub fn label(&self) -> &str {
        if self.nickname_path.is_empty() {
            &self.serial_number
        } else {
            &self.nickname_path
        }
    }
}

/// Serial fields written by hand or by older launchers are integers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrInt {
    Int(i64),
    Str(String),
}

fn serial_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Int(n) => n.to_string(),
        StringOrInt::Str(s) => s,
    })
}

fn absolute_serial_from_any<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::Int(n) => u32::try_from(n).map_err(serde::de::Error::custom),
        StringOrInt::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn non_empty_path(value: &str) -> Option<&Path> {
    if value.trim().is_empty() {
        None
    } else {
        Some(Path::new(value))
    }
}

/// The whole `config.toml` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub current_config: String,
    pub configurations: BTreeMap<String, InstanceConfig>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        let mut configurations = BTreeMap::new();
        configurations.insert(
            AppConfig::DEFAULT_CONFIG_NAME.to_string(),
            InstanceConfig::default(),
        );
        Self {
            current_config: AppConfig::DEFAULT_CONFIG_NAME.to_string(),
            configurations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_document() {
        let doc = ConfigDocument::default();
        assert_eq!(doc.current_config, "default");
        let instance = &doc.configurations["default"];
        assert_eq!(instance.absolute_serial_number, 1);
        assert_eq!(instance.version_path, "0.0.0");
        assert_eq!(instance.nickname_path, "默认配置");
    }

    #[test]
    fn test_partial_record_uses_defaults() {
        let instance: InstanceConfig =
            toml::from_str("serial_number = \"7\"\nmai_path = \"/srv/bot\"").unwrap();
        assert_eq!(instance.serial_number, "7");
        assert_eq!(instance.mai_path, "/srv/bot");
        assert!(instance.venv_path.is_empty());
        assert_eq!(instance.install_options, InstallOptions::default());
    }

    #[test]
    fn test_serials_accept_strings_and_integers() {
        let instance: InstanceConfig =
            toml::from_str("serial_number = 12\nabsolute_serial_number = \"4\"").unwrap();
        assert_eq!(instance.serial_number, "12");
        assert_eq!(instance.absolute_serial_number, 4);

        let instance: InstanceConfig =
            toml::from_str("serial_number = \"bot\"\nabsolute_serial_number = 7").unwrap();
        assert_eq!(instance.serial_number, "bot");
        assert_eq!(instance.absolute_serial_number, 7);

        assert!(toml::from_str::<InstanceConfig>("absolute_serial_number = \"x\"").is_err());
        assert!(toml::from_str::<InstanceConfig>("absolute_serial_number = -1").is_err());
    }

    #[test]
    fn test_adapter_marker() {
        let mut instance = InstanceConfig::default();
        instance.adapter_path = AppConfig::NO_ADAPTER_SENTINEL.to_string();
        assert!(instance.has_no_adapter_marker());
        assert!(instance.adapter_dir().is_none());

        instance.adapter_path = "/srv/adapter".to_string();
        assert_eq!(instance.adapter_dir(), Some(Path::new("/srv/adapter")));
    }

    #[test]
    fn test_selected_count() {
        let options = InstallOptions {
            install_adapter: true,
            install_napcat: true,
            ..Default::default()
        };
        assert_eq!(options.selected_count(), 2);
    }
}
