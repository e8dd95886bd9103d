use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::{RefError, Result};

/// Directory of article supplements inside an author directory.
pub const SUPPLEMENT_DIR: &str = "Supplemental";

/// Why a file is copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    New,
    Newer,
    Clobber,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncReason::New => "new",
            SyncReason::Newer => "overwrite",
            SyncReason::Clobber => "clobber",
        };
        f.write_str(label)
    }
}

/// One planned copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    pub source: PathBuf,
    pub target: PathBuf,
    pub reason: SyncReason,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.source.display(), self.target.display(), self.reason)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn is_year(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_digit())
}

/// Files under `<year>/<author>/` and `<year>/<author>/Supplemental/`,
/// relative to `root`.
fn library_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(3).max_depth(4).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            RefError::fs(&path, e.into())
        })?;
        if !entry.file_type().is_file() || is_hidden(entry.path()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let parts: Vec<&str> = relative.iter().filter_map(|part| part.to_str()).collect();
        let wanted = match parts.as_slice() {
            [year, author, _] => is_year(year) && !author.starts_with('.'),
            [year, author, supplement, _] => {
                is_year(year) && !author.starts_with('.') && *supplement == SUPPLEMENT_DIR
            }
            _ => false,
        };
        if wanted {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Modification time in whole seconds, rounded down to an even number so
/// that file systems with two-second resolution compare equal.
fn even_seconds(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| RefError::fs(path, e))?;
    let seconds = modified.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    Ok(seconds - seconds % 2)
}

/// Work out which files of `from` are missing from `to` or newer there.
/// With `clobber` every file is copied.
pub fn plan_sync(from: &Path, to: &Path, clobber: bool) -> Result<Vec<SyncAction>> {
    if !from.is_dir() {
        return Err(RefError::InvalidInput(format!(
            "Sync source {} is not a directory",
            from.display()
        )));
    }
    let mut actions = Vec::new();
    for relative in library_files(from)? {
        let source = from.join(&relative);
        let target = to.join(&relative);
        let reason = if !target.exists() {
            Some(SyncReason::New)
        } else if even_seconds(&source)? > even_seconds(&target)? {
            Some(SyncReason::Newer)
        } else if clobber {
            Some(SyncReason::Clobber)
        } else {
            None
        };
        match reason {
            Some(reason) => actions.push(SyncAction { source, target, reason }),
            None => debug!("{} is up to date", target.display()),
        }
    }
    Ok(actions)
}

/// Copy the planned files, carrying over their modification times.
pub fn apply_sync(actions: &[SyncAction]) -> Result<()> {
    for action in actions {
        if let Some(parent) = action.target.parent() {
            fs::create_dir_all(parent).map_err(|e| RefError::fs(parent, e))?;
        }
        fs::copy(&action.source, &action.target).map_err(|e| RefError::fs(&action.target, e))?;
        let modified = fs::metadata(&action.source)
            .and_then(|meta| meta.modified())
            .map_err(|e| RefError::fs(&action.source, e))?;
        File::options()
            .write(true)
            .open(&action.target)
            .and_then(|file| file.set_modified(modified))
            .map_err(|e| RefError::fs(&action.target, e))?;
        info!("{action}");
    }
    Ok(())
}
