use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AtlasError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid identifier format: {0}")]
    InvalidFormat(String),
    #[error("Feature ID already exists: {0}")]
    IdExists(String),
    #[error("Feature name must not be empty")]
    EmptyName,
    #[error("Feature summary must not be empty")]
    EmptySummary,
    #[error("{} is locked by another process (gave up after {:?})", path.display(), timeout)]
    LockTimeout { path: PathBuf, timeout: Duration },
    #[error("Manifest format error: {0}")]
    FormatError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Remote catalog error: {0}")]
    RemoteError(String),
    #[error("Remote catalog call timed out after {0:?}")]
    RemoteTimeout(Duration),
    /// A promotion was accepted remotely but could not be recorded locally.
    #[error(
        "Sync aborted: {local_id} was created remotely as {server_id} but the manifest could not be saved: {source}"
    )]
    SyncAborted {
        local_id: String,
        server_id: String,
        #[source]
        source: Box<AtlasError>,
    },
}

impl AtlasError {
    /// Whether retrying the same operation later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AtlasError::LockTimeout { .. }
                | AtlasError::RemoteTimeout(_)
                | AtlasError::RemoteError(_)
        )
    }
}
