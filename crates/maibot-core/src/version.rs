//! Version rules for MaiBot releases.
//!
//! MaiBot version strings are loose: `0.6.3-fix4`, `v0.7.0 (beta)`, branch
//! names such as `main`, or the literal `classical`. These helpers decide
//! which companions an instance needs based on that string alone.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Adapter release matching a bot version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterVersion {
    /// Legacy bots talk to NapCat directly.
    NotRequired,
    /// A tag or branch of the adapter repository.
    Ref(String),
    /// The version string could not be interpreted.
    Unknown,
}

impl AdapterVersion {
    pub fn as_ref_name(&self) -> Option<&str> {
        match self {
            AdapterVersion::Ref(name) => Some(name),
            _ => None,
        }
    }

    /// Whether the ref is a branch rather than a tag.
    pub fn is_branch(&self) -> bool {
        matches!(self.as_ref_name(), Some("main") | Some("dev"))
    }
}

impl fmt::Display for AdapterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterVersion::NotRequired => write!(f, "无需适配器"),
            AdapterVersion::Ref(name) => write!(f, "{}", name),
            AdapterVersion::Unknown => write!(f, "未知版本"),
        }
    }
}

/// Everything the launcher derives from a version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirements {
    pub legacy: bool,
    pub needs_adapter: bool,
    pub needs_mongodb: bool,
    pub adapter_version: AdapterVersion,
    pub supports_lpmm: bool,
}

fn annotation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^)]*\)").expect("annotation pattern is valid"))
}

/// Lowercase, trim, and strip a leading `v` and any `(...)` annotation.
fn normalize(version: &str) -> String {
    let lowered = version.trim().to_lowercase();
    let stripped = lowered.strip_prefix('v').unwrap_or(lowered.as_str());
    annotation_regex().replace_all(stripped, "").trim().to_string()
}

/// Numeric components before the first `-`.
fn numeric_parts(normalized: &str) -> Vec<&str> {
    normalized
        .split('-')
        .next()
        .unwrap_or_default()
        .split('.')
        .collect()
}

/// Major and minor, or `None` if either is not a number.
fn major_minor(version: &str) -> Option<(u32, u32)> {
    let normalized = normalize(version);
    let parts = numeric_parts(&normalized);
    if parts.len() < 2 {
        return None;
    }
    let major = parts[0].trim().parse().ok()?;
    let minor = parts[1].trim().parse().ok()?;
    Some((major, minor))
}

fn is_branch_name(normalized: &str) -> bool {
    normalized.contains("main") || normalized.contains("dev")
}

/// Parse into `(major, minor, patch)`, with zero for anything missing.
pub fn parse_version(version: &str) -> (u32, u32, u32) {
    let normalized = normalize(version);
    let parts = numeric_parts(&normalized);
    let component = |idx: usize| -> u32 {
        parts
            .get(idx)
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(0)
    };
    (component(0), component(1), component(2))
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parse_version(a).cmp(&parse_version(b))
}

/// `classical`, or anything below 0.6.
pub fn is_legacy_version(version: &str) -> bool {
    let normalized = normalize(version);
    if normalized.is_empty() {
        return false;
    }
    if normalized == "classical" {
        return true;
    }
    match major_minor(&normalized) {
        Some((major, minor)) => major == 0 && minor < 6,
        None => {
            debug!("Unparsable version {:?}, treating as current", version);
            false
        }
    }
}

/// Versions below 0.7 store data in MongoDB.
///
/// A version without a `major.minor` pair counts as new; one whose pair does
/// not parse as numbers is assumed to need MongoDB.
pub fn needs_mongodb(version: &str) -> bool {
    let normalized = normalize(version);
    if normalized.is_empty() {
        return false;
    }
    if normalized == "classical" {
        return true;
    }
    if is_branch_name(&normalized) {
        return false;
    }
    let parts = numeric_parts(&normalized);
    if parts.len() < 2 {
        return false;
    }
    match (parts[0].trim().parse::<u32>(), parts[1].trim().parse::<u32>()) {
        (Ok(major), Ok(minor)) => major == 0 && minor < 7,
        _ => {
            debug!("Unparsable version {:?}, assuming MongoDB is needed", version);
            true
        }
    }
}

pub fn needs_adapter(version: &str) -> bool {
    !is_legacy_version(version)
}

/// LPMM knowledge scripts shipped after 0.6.3.
pub fn supports_lpmm(version: &str) -> bool {
    let normalized = normalize(version);
    if is_branch_name(&normalized) {
        return true;
    }
    if normalized == "classical" {
        return false;
    }
    parse_version(&normalized) > (0, 6, 3)
}

/// Pick the adapter release that matches a bot version.
pub fn adapter_version_for(version: &str) -> AdapterVersion {
    if is_legacy_version(version) {
        return AdapterVersion::NotRequired;
    }

    let normalized = normalize(version);
    if normalized.contains("main") {
        return AdapterVersion::Ref("main".to_string());
    }
    if normalized.contains("dev") {
        return AdapterVersion::Ref("dev".to_string());
    }

    let parts = numeric_parts(&normalized);
    let major: u32 = match parts.first().and_then(|p| p.trim().parse().ok()) {
        Some(major) => major,
        None => return AdapterVersion::Unknown,
    };
    let minor: u32 = parts
        .get(1)
        .and_then(|p| p.trim().parse().ok())
        .unwrap_or(0);

    let tag = match (major, minor) {
        (0, 6) => "0.2.3",
        (0, 7..=8) => "0.4.2",
        _ => "main",
    };
    AdapterVersion::Ref(tag.to_string())
}

pub fn requirements_for(version: &str) -> VersionRequirements {
    VersionRequirements {
        legacy: is_legacy_version(version),
        needs_adapter: needs_adapter(version),
        needs_mongodb: needs_mongodb(version),
        adapter_version: adapter_version_for(version),
        supports_lpmm: supports_lpmm(version),
    }
}

fn quoted_assignment(key: &str) -> Regex {
    Regex::new(&format!(r#"{}\s*=\s*["']([^"']+)["']"#, key)).expect("assignment pattern is valid")
}

/// Read a version string from files shipped in a bot checkout.
pub fn detect_version_from_files(mai_path: &Path) -> Option<String> {
    for name in ["version.txt", "VERSION"] {
        let path = mai_path.join(name);
        if let Ok(contents) = fs::read_to_string(&path) {
            let version = contents.trim();
            if !version.is_empty() {
                info!("Detected version {} from {}", version, path.display());
                return Some(version.to_string());
            }
        }
    }

    if let Ok(contents) = fs::read_to_string(mai_path.join("pyproject.toml")) {
        if let Some(caps) = quoted_assignment("version").captures(&contents) {
            info!("Detected version {} from pyproject.toml", &caps[1]);
            return Some(caps[1].to_string());
        }
    }

    if let Ok(contents) = fs::read_to_string(mai_path.join("bot.py")) {
        for key in ["__version__", "VERSION", "version"] {
            if let Some(caps) = quoted_assignment(key).captures(&contents) {
                info!("Detected version {} from bot.py", &caps[1]);
                return Some(caps[1].to_string());
            }
        }
    }

    None
}
