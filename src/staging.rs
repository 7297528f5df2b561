//! Staging directory helpers.
//!
//! The staging directory holds copied templates, the terraform variable
//! file and terraform's state file. Copies are skipped when their
//! destination already exists so repeated runs keep local edits and state.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::{blog, blog_debug, Error, Result};

/// Recursively copy `from` into `to` unless `to` already exists.
///
/// The tree is copied into a sibling temporary directory and renamed into
/// place, so `to` only ever appears complete. Returns `false` when the
/// copy was skipped.
pub fn copy_tree_if_absent(from: &Path, to: &Path) -> Result<bool> {
    if to.exists() {
        blog!("{} already exists, not copying", to.display());
        return Ok(false);
    }
    if !from.is_dir() {
        return Err(Error::Validation(format!(
            "Template directory not found: {}",
            from.display()
        )));
    }

    let parent = match to.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let partial = tempfile::Builder::new()
        .prefix(".bminfra-copy-")
        .tempdir_in(parent)?;

    blog_debug!(
        "Copying {} -> {} via {}",
        from.display(),
        to.display(),
        partial.path().display()
    );
    // Dropping `partial` on error removes whatever was copied so far.
    copy_tree(from, partial.path())?;

    let staged = partial.keep();
    if let Err(e) = fs::rename(&staged, to) {
        let _ = fs::remove_dir_all(&staged);
        return Err(e.into());
    }
    Ok(true)
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Validation(e.to_string()))?;
        let target = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Merge `values` into the JSON object stored at `file`.
///
/// Keys not named in `values` are preserved. A missing file starts empty.
pub fn update_tfvars(file: &Path, values: Map<String, Value>) -> Result<()> {
    let mut current = if file.exists() {
        match serde_json::from_str::<Value>(&fs::read_to_string(file)?)? {
            Value::Object(map) => map,
            _ => {
                return Err(Error::Validation(format!(
                    "{} does not hold a JSON object",
                    file.display()
                )))
            }
        }
    } else {
        Map::new()
    };

    blog_debug!(
        "Updating {}: {}",
        file.display(),
        values.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    current.extend(values);

    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, serde_json::to_string_pretty(&Value::Object(current))?)?;
    Ok(())
}

/// Remove a file or directory tree. Returns `false` if nothing was there.
pub fn remove_path(path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
        Ok(meta) => {
            if meta.is_dir() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
            blog!("Removed {}", path.display());
            Ok(true)
        }
    }
}
