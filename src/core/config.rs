//! Optional per-manifest settings from `.feature-atlas.toml`.

use crate::core::error::AtlasError;
use crate::core::lock::{DEFAULT_LOCK_TIMEOUT, DEFAULT_POLL_INTERVAL, LockPolicy};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = ".feature-atlas.toml";
pub const REGISTRY_ENV: &str = "FEATURE_ATLAS_REGISTRY";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AtlasConfig {
    pub lock: LockConfig,
    pub sync: SyncConfig,
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LockConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Deadline for each remote creation call.
    pub remote_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory of the file-backed registry. Relative paths resolve against the manifest directory.
    pub path: Option<PathBuf>,
}

impl AtlasConfig {
    /// Read the config next to `manifest_path`. A missing file yields defaults.
    pub fn load_for_manifest(manifest_path: &Path) -> Result<Self, AtlasError> {
        let dir = manifest_dir(manifest_path);
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)?;
        let mut config: AtlasConfig = toml::from_str(&content).map_err(|e| {
            AtlasError::ConfigError(format!("{}: {}", config_path.display(), e))
        })?;
        if let Some(path) = &config.registry.path
            && path.is_relative()
        {
            config.registry.path = Some(dir.join(path));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AtlasError> {
        if self.lock.poll_interval_ms == 0 {
            return Err(AtlasError::ConfigError(
                "lock.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.sync.remote_timeout_secs == 0 {
            return Err(AtlasError::ConfigError(
                "sync.remote_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy::platform(
            Duration::from_millis(self.lock.timeout_ms),
            Duration::from_millis(self.lock.poll_interval_ms),
        )
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.remote_timeout_secs)
    }

    /// Registry directory: CLI flag, then `FEATURE_ATLAS_REGISTRY`, then the config file.
    pub fn registry_path(&self, flag: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = flag {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = env::var(REGISTRY_ENV)
            && !path.trim().is_empty()
        {
            return Some(PathBuf::from(path));
        }
        self.registry.path.clone()
    }
}

fn manifest_dir(manifest_path: &Path) -> &Path {
    match manifest_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
