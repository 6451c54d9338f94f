// Path keys, package names and modification times

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{IndexError, Result};

/// Canonical index key for a path.
///
/// The result is absolute and lexically cleaned, so `./a/../b.py` and
/// `b.py` map to the same key. On case-insensitive platforms the key is
/// lower-cased and uses backslashes.
pub fn normalize_path(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }

    let key = cleaned.to_string_lossy().into_owned();
    if cfg!(windows) {
        key.replace('/', "\\").to_lowercase()
    } else {
        key
    }
}

/// Dotted package path for a source file.
///
/// Walks upward from the file's directory while each directory holds
/// `marker`. With `include_module` the file stem is appended.
pub fn package_for(path: &Path, marker: &str, include_module: bool) -> String {
    let mut parts = Vec::new();
    if include_module {
        if let Some(stem) = path.file_stem() {
            parts.push(stem.to_string_lossy().into_owned());
        }
    }

    let mut dir = path.parent();
    while let Some(current) = dir {
        if !current.join(marker).is_file() {
            break;
        }
        match current.file_name() {
            Some(name) => parts.push(name.to_string_lossy().into_owned()),
            None => break,
        }
        dir = current.parent();
    }

    parts.reverse();
    parts.join(".")
}

/// Modification time in fractional seconds since the epoch
pub fn modified_time(path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(path).map_err(|e| IndexError::io(path, e))?;
    let modified = metadata.modified().map_err(|e| IndexError::io(path, e))?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(since_epoch)
}
