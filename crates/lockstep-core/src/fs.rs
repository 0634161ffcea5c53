//! File helpers shared by the manifest writers

use crate::error::{RestoreError, RestoreResult};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `contents` through a temporary file in the same
/// directory, so readers never see a partial file
pub fn write_atomic(path: &Path, contents: &[u8]) -> RestoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| RestoreError::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| RestoreError::io(dir, e))?;
    temp.write_all(contents)
        .map_err(|e| RestoreError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| RestoreError::io(temp.path(), e))?;
    temp.persist(path)
        .map_err(|e| RestoreError::io(path, e.error))?;
    Ok(())
}

/// Write only when the bytes on disk differ; returns whether a write happened
pub fn write_if_changed(path: &Path, contents: &[u8]) -> RestoreResult<bool> {
    match std::fs::read(path) {
        Ok(existing) if existing == contents => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(RestoreError::io(path, e)),
    }
    write_atomic(path, contents)?;
    Ok(true)
}

/// Read a file, `None` when it does not exist
pub fn read_optional(path: &Path) -> RestoreResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RestoreError::io(path, e)),
    }
}
