use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub fn create_directory_for_file(p: &Path) -> Result {
    if let Some(parent_dir) = p.parent() {
        if parent_dir.as_os_str().is_empty() {
            return Ok(());
        }

        std::fs::create_dir_all(parent_dir).map_err(|e| {
            Error::Runtime(format!(
                "Failed to create output directory for file '{}' ({e})",
                p.to_string_lossy()
            ))
        })?;
    }

    Ok(())
}

/// Sibling path used to stage a file before it is moved into place
pub fn staging_path(p: &Path) -> PathBuf {
    let mut name = p.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    p.with_file_name(name)
}

/// Removes the file if it exists, a missing file is not an error
pub fn remove_file_if_exists(p: &Path) -> Result {
    match std::fs::remove_file(p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::IOError(e)),
    }
}
