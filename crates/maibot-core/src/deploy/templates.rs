//! First-run configuration files copied from the shipped templates.

use crate::config::InstallationConfig;
use crate::{LauncherError, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

const TEMPLATE_DIR: &str = "template";
const ADAPTER_TEMPLATE_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^PORT=\d+").expect("port pattern is valid"))
}

/// Force `PORT=` to the default bot port, appending the line if absent.
pub fn set_env_port(content: &str, port: u16) -> String {
    let line = format!("PORT={}", port);
    if port_regex().is_match(content) {
        port_regex().replace_all(content, line.as_str()).into_owned()
    } else {
        let mut out = content.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&line);
        out.push('\n');
        out
    }
}

fn copy_if_absent(source: &Path, target: &Path) -> Result<bool> {
    if target.exists() {
        info!("Keeping existing {}", target.display());
        return Ok(false);
    }
    if !source.exists() {
        warn!("Template {} not found", source.display());
        return Ok(false);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
    }
    fs::copy(source, target).map_err(|e| LauncherError::io_with_path(e, source))?;
    Ok(true)
}

/// Create `config/bot_config.toml` and `.env` for a fresh checkout.
///
/// Returns the files that were written.
pub fn setup_bot_config(mai_dir: &Path) -> Result<Vec<PathBuf>> {
    let template_dir = mai_dir.join(TEMPLATE_DIR);
    let mut written = Vec::new();

    let bot_config = mai_dir.join("config").join("bot_config.toml");
    if copy_if_absent(&template_dir.join("bot_config_template.toml"), &bot_config)? {
        written.push(bot_config);
    }

    let env_file = mai_dir.join(".env");
    if copy_if_absent(&template_dir.join("template.env"), &env_file)? {
        let content =
            fs::read_to_string(&env_file).map_err(|e| LauncherError::io_with_path(e, &env_file))?;
        fs::write(
            &env_file,
            set_env_port(&content, InstallationConfig::DEFAULT_BOT_PORT),
        )
        .map_err(|e| LauncherError::io_with_path(e, &env_file))?;
        written.push(env_file);
    }

    Ok(written)
}

/// `template_config.toml` and `config_template.toml` both become `config.toml`.
pub fn adapter_target_name(file_name: &str) -> String {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    };
    let stem = stem.strip_prefix("template_").unwrap_or(stem);
    let stem = stem.strip_suffix("_template").unwrap_or(stem);
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

/// Copy the adapter's config templates next to its `main.py`.
pub fn setup_adapter_config(adapter_dir: &Path) -> Result<Vec<PathBuf>> {
    let template_dir = adapter_dir.join(TEMPLATE_DIR);
    if !template_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut templates: Vec<PathBuf> = fs::read_dir(&template_dir)
        .map_err(|e| LauncherError::io_with_path(e, &template_dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| ADAPTER_TEMPLATE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        })
        .collect();
    templates.sort();

    let mut written = Vec::new();
    for template in templates {
        let Some(name) = template.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let target = adapter_dir.join(adapter_target_name(name));
        if copy_if_absent(&template, &target)? {
            written.push(target);
        }
    }
    Ok(written)
}
