//! Crash-safe file replacement.
//!
//! Contents are staged in a temporary file in the target's directory, forced to
//! disk, given the final mode, then renamed over the target. Readers observe
//! either the old file or the new one.

use crate::core::error::AtlasError;
#[cfg(unix)]
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// World-readable, owner-writable.
#[cfg(unix)]
pub const MANIFEST_MODE: u32 = 0o644;

/// A fully written, synced temporary file that has not replaced its target yet.
///
/// Dropping it without calling [`StagedWrite::commit`] removes the temporary file.
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    pub fn stage(target: &Path, contents: &[u8]) -> Result<Self, AtlasError> {
        let dir = parent_dir(target);
        let mut tmp = tempfile::Builder::new()
            .prefix(".feature-atlas.")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(contents)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        set_mode(tmp.path())?;
        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn commit(self) -> Result<(), AtlasError> {
        let target = self.target;
        // On failure the PersistError owns the temp file and removes it when dropped.
        self.tmp.persist(&target).map_err(|e| AtlasError::IoError(e.error))?;
        sync_dir(parent_dir(&target));
        debug!(path = %target.display(), "atomic write committed");
        Ok(())
    }
}

pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<(), AtlasError> {
    StagedWrite::stage(target, contents)?.commit()
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path) -> Result<(), AtlasError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(MANIFEST_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> Result<(), AtlasError> {
    Ok(())
}

// Best effort: persists the rename itself on filesystems that need it.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
