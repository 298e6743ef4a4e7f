//! Manifest discovery.

use crate::core::error::AtlasError;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_MANIFEST_NAME: &str = ".feature-atlas.yaml";
/// Marks the project boundary; the search never climbs above it.
pub const REPO_ROOT_MARKER: &str = ".git";

/// Locate the manifest.
///
/// An explicit path must exist and is never substituted by a search. Otherwise
/// the walk starts at `start_dir` and climbs until it finds the manifest, hits a
/// directory containing [`REPO_ROOT_MARKER`], or reaches the filesystem root.
pub fn discover(explicit: Option<&Path>, start_dir: &Path) -> Result<PathBuf, AtlasError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(AtlasError::NotFound(format!(
            "manifest {} does not exist or is not a file",
            path.display()
        )));
    }

    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(DEFAULT_MANIFEST_NAME);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "manifest discovered");
            return Ok(candidate);
        }
        if current.join(REPO_ROOT_MARKER).exists() {
            debug!(dir = %current.display(), "reached repository root without a manifest");
            break;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    Err(AtlasError::NotFound(format!(
        "{} not found in {} or its parents. Run `feature-atlas init` first.",
        DEFAULT_MANIFEST_NAME,
        start_dir.display()
    )))
}
