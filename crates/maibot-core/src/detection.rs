//! Locating existing bot, adapter, NapCat and MongoDB installations.
//!
//! Well-known locations are checked first, then each search root is walked a
//! few levels deep. Virtual environments and dependency caches are skipped.

use crate::config::InstallationConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

const ADAPTER_DIR_NAMES: &[&str] = &["MaiBot-Napcat-Adapter", "adapter", "Adapter"];

fn is_skipped(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| InstallationConfig::SEARCH_SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Files named `file_name` under `root`, shallowest first.
pub(crate) fn find_files(root: &Path, file_name: &str, max_depth: usize) -> Vec<PathBuf> {
    let mut hits: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| (e.depth(), e.into_path()))
        .collect();
    hits.sort_by_key(|(depth, _)| *depth);
    hits.into_iter().map(|(_, path)| path).collect()
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Directories checked before any search root.
pub fn mai_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = [".", "./MaiM-with-u", "./MaiBot", "../MaiBot"]
        .iter()
        .map(PathBuf::from)
        .collect();
    if cfg!(windows) {
        candidates.push(PathBuf::from("C:/MaiBot"));
        candidates.push(PathBuf::from("D:/MaiBot"));
    }
    candidates
}

fn find_bot_dir(candidates: &[PathBuf], roots: &[PathBuf]) -> Option<PathBuf> {
    for candidate in candidates {
        if candidate.join("bot.py").is_file() {
            info!("Detected bot at {}", candidate.display());
            return Some(absolute(candidate));
        }
    }

    for root in roots {
        if !root.is_dir() {
            debug!("Skipping missing search root {}", root.display());
            continue;
        }
        let depth = InstallationConfig::SEARCH_MAX_DEPTH + 1;
        if let Some(bot_py) = find_files(root, "bot.py", depth).into_iter().next() {
            if let Some(dir) = bot_py.parent() {
                info!("Detected bot at {}", dir.display());
                return Some(absolute(dir));
            }
        }
    }

    warn!("No bot installation detected");
    None
}

/// Find a directory containing `bot.py`.
pub fn detect_mai_path(search_roots: &[PathBuf]) -> Option<PathBuf> {
    find_bot_dir(&mai_candidates(), search_roots)
}

/// Find the adapter that belongs to a bot checkout.
pub fn detect_adapter_path(mai_path: &Path) -> Option<PathBuf> {
    let parent = mai_path.parent().unwrap_or(mai_path);

    let mut candidates: Vec<PathBuf> = ADAPTER_DIR_NAMES
        .iter()
        .map(|name| parent.join(name))
        .collect();
    candidates.push(mai_path.join(InstallationConfig::ADAPTER_DIR_NAME));

    for candidate in &candidates {
        if candidate.join("main.py").is_file() {
            info!("Detected adapter at {}", candidate.display());
            return Some(absolute(candidate));
        }
    }

    let depth = InstallationConfig::SEARCH_MAX_DEPTH + 1;
    let found = find_files(parent, "main.py", depth)
        .into_iter()
        .filter_map(|main_py| main_py.parent().map(Path::to_path_buf))
        .find(|dir| {
            dir.strip_prefix(parent)
                .unwrap_or(dir)
                .to_string_lossy()
                .to_lowercase()
                .contains("adapter")
        });

    match found {
        Some(dir) => {
            info!("Detected adapter at {}", dir.display());
            Some(absolute(&dir))
        }
        None => {
            warn!("No adapter detected near {}", mai_path.display());
            None
        }
    }
}

/// `NapCatWinBootMain.exe` inside an installed `NapCat.*.Shell` or
/// `NapCat.*.Framework` directory under `dir`.
pub fn find_installed_napcat(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut layouts: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    layouts.sort();

    for suffix in [".Shell", ".Framework"] {
        for layout in &layouts {
            let name = layout
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if !(name.starts_with("NapCat.") && name.ends_with(suffix)) {
                continue;
            }
            let exe = layout.join(InstallationConfig::NAPCAT_EXE);
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

fn napcat_well_known_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg!(windows) {
        dirs.push(PathBuf::from("C:/Program Files/NapCat"));
        dirs.push(PathBuf::from("C:/Program Files (x86)/NapCat"));
        dirs.push(PathBuf::from("D:/NapCat"));
    }
    dirs.push(PathBuf::from("./NapCat"));
    dirs.push(PathBuf::from("../NapCat"));
    dirs
}

fn napcat_in(dir: &Path) -> Option<PathBuf> {
    let direct = dir.join(InstallationConfig::NAPCAT_EXE);
    if direct.is_file() {
        return Some(direct);
    }
    find_installed_napcat(dir)
}

/// Find `NapCatWinBootMain.exe`.
pub fn detect_napcat_path(search_roots: &[PathBuf]) -> Option<PathBuf> {
    for dir in napcat_well_known_dirs().iter().chain(search_roots) {
        if let Some(exe) = napcat_in(dir) {
            info!("Detected NapCat at {}", exe.display());
            return Some(absolute(&exe));
        }
    }

    for root in search_roots {
        let depth = InstallationConfig::SEARCH_MAX_DEPTH + 1;
        if let Some(exe) = find_files(root, InstallationConfig::NAPCAT_EXE, depth)
            .into_iter()
            .next()
        {
            info!("Detected NapCat at {}", exe.display());
            return Some(absolute(&exe));
        }
    }

    warn!("No NapCat installation detected");
    None
}

pub(crate) fn mongod_name() -> &'static str {
    if cfg!(windows) {
        "mongod.exe"
    } else {
        "mongod"
    }
}

/// `mongod` under `dir/bin`, or anywhere below `dir`.
pub fn find_mongod(dir: &Path) -> Option<PathBuf> {
    let direct = dir.join("bin").join(mongod_name());
    if direct.is_file() {
        return Some(direct);
    }
    let depth = InstallationConfig::SEARCH_MAX_DEPTH + 2;
    find_files(dir, mongod_name(), depth).into_iter().next()
}

/// Find a MongoDB directory, i.e. one containing `bin/mongod`.
pub fn detect_mongodb_path(search_roots: &[PathBuf]) -> Option<PathBuf> {
    for root in search_roots {
        let found = find_mongod(root).and_then(|exe| {
            let bin = exe.parent()?;
            if bin.file_name()? == "bin" {
                bin.parent().map(Path::to_path_buf)
            } else {
                None
            }
        });
        if let Some(dir) = found {
            info!("Detected MongoDB at {}", dir.display());
            return Some(absolute(&dir));
        }
    }
    debug!("No MongoDB installation detected");
    None
}
