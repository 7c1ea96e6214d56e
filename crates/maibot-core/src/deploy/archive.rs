//! Archive extraction and directory copying.

use crate::{LauncherError, Result};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Extract a zip archive into `dest`.
///
/// Entries whose names would escape `dest` are skipped. Unix mode bits are
/// restored where the archive records them.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io_with_path(e, archive_path))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| {
        LauncherError::InstallationFailed {
            message: format!("Invalid zip archive {}: {}", archive_path.display(), e),
        }
    })?;

    fs::create_dir_all(dest).map_err(|e| LauncherError::io_with_path(e, dest))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|e| LauncherError::io_with_path(e, &outpath))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
        }
        let mut outfile =
            File::create(&outpath).map_err(|e| LauncherError::io_with_path(e, &outpath))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| LauncherError::io_with_path(e, &outpath))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    info!("Extracted {} to {}", archive_path.display(), dest.display());
    Ok(())
}

/// Extract a gzip-compressed tarball into `dest`.
pub fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io_with_path(e, archive_path))?;
    fs::create_dir_all(dest).map_err(|e| LauncherError::io_with_path(e, dest))?;

    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    tar::Archive::new(decoder)
        .unpack(dest)
        .map_err(|e| LauncherError::InstallationFailed {
            message: format!("Failed to extract {}: {}", archive_path.display(), e),
        })?;

    info!("Extracted {} to {}", archive_path.display(), dest.display());
    Ok(())
}

fn is_tar_gz(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".tgz")
}

/// Extract by file extension: `.tar.gz`/`.tgz` or zip.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    if is_tar_gz(archive_path) {
        extract_tar_gz(archive_path, dest)
    } else {
        extract_zip(archive_path, dest)
    }
}

/// GitHub archives wrap their content in one directory; find it.
///
/// Returns the first directory that is not `__MACOSX`, or `dir` when
/// there is none.
pub fn single_root_dir(dir: &Path) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| LauncherError::io_with_path(e, dir))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.file_name().is_some_and(|n| n != "__MACOSX"))
        .collect();
    dirs.sort();
    Ok(dirs.into_iter().next().unwrap_or_else(|| dir.to_path_buf()))
}

/// Copy `src` into `dst`, creating directories as needed.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    copy_dir_filtered(src, dst, |_| true)
}

/// Copy the entries of `src` for which `include` holds, relative to `src`.
///
/// A rejected directory is skipped with everything below it. Symbolic links
/// are copied as links, never followed.
pub fn copy_dir_filtered(src: &Path, dst: &Path, include: impl Fn(&Path) -> bool) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| LauncherError::io_with_path(e, dst))?;

    let walker = WalkDir::new(src).min_depth(1).into_iter().filter_entry(|entry| {
        entry
            .path()
            .strip_prefix(src)
            .map(&include)
            .unwrap_or(false)
    });

    for entry in walker {
        let entry = entry.map_err(|e| LauncherError::Io {
            message: format!("Failed to walk {}: {}", src.display(), e),
            path: e.path().map(Path::to_path_buf),
            source: None,
        })?;
        let relative = entry.path().strip_prefix(src).map_err(|e| LauncherError::Other(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| LauncherError::io_with_path(e, &target))?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
            }
            fs::copy(entry.path(), &target)
                .map_err(|e| LauncherError::io_with_path(e, entry.path()))?;
        }
    }
    Ok(())
}

/// Recreate the link at `src` as `dst`.
#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = fs::read_link(src).map_err(|e| LauncherError::io_with_path(e, src))?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| LauncherError::io_with_path(e, parent))?;
    }
    std::os::unix::fs::symlink(&link, dst).map_err(|e| LauncherError::io_with_path(e, dst))
}

/// Links to files are copied as files; links to directories are skipped.
#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        tracing::warn!("Skipping directory link {}", src.display());
        return Ok(());
    }
    fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| LauncherError::io_with_path(e, src))
}
