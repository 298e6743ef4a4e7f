//! The feature manifest: in-memory catalog plus crash-safe persistence.
//!
//! On disk the manifest is a YAML document:
//!
//! ```yaml
//! version: "1"
//! features:
//!   FT-000042:
//!     name: Auth
//!     summary: Authentication flow
//!     owner: Security
//!     tags: [auth, security]
//!     synced: true
//!     synced_at: 2026-10-14T09:30:00Z
//!     alias: FT-LOCAL-auth
//!   FT-LOCAL-dark-mode:
//!     name: Dark mode
//!     summary: Theme toggle
//!     synced: false
//! ```
//!
//! Local-keyed records are always unsynced; server-keyed records are always
//! synced and carry their former local identifier as `alias`.

use crate::core::atomic;
use crate::core::error::AtlasError;
use crate::core::ids;
use crate::core::lock::LockPolicy;
use crate::core::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub synced: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::ts_format"
    )]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl FeatureRecord {
    /// A fresh, unsynced record with normalized fields.
    pub fn unsynced(name: &str, summary: &str, owner: Option<&str>, tags: &[String]) -> Self {
        Self {
            name: name.trim().to_string(),
            summary: summary.trim().to_string(),
            owner: owner
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string),
            tags: normalize_tags(tags),
            synced: false,
            synced_at: None,
            alias: None,
        }
    }
}

pub fn normalize_tags(tags: &[String]) -> BTreeSet<String> {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct NewFeature<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub summary: &'a str,
    pub owner: Option<&'a str>,
    pub tags: &'a [String],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub version: String,
    features: BTreeMap<String, FeatureRecord>,
}

/// Wire shape: a missing or null `features` section loads as an empty map.
#[derive(Deserialize)]
struct RawManifest {
    version: Option<String>,
    #[serde(default)]
    features: Option<BTreeMap<String, FeatureRecord>>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            features: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, AtlasError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AtlasError::NotFound(format!(
                    "manifest {} does not exist",
                    path.display()
                )));
            }
            Err(e) => return Err(AtlasError::IoError(e)),
        };
        let manifest = Self::from_yaml(&raw).map_err(|e| match e {
            AtlasError::FormatError(msg) => {
                AtlasError::FormatError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        debug!(path = %path.display(), features = manifest.len(), "manifest loaded");
        Ok(manifest)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, AtlasError> {
        let parsed: RawManifest =
            serde_yaml::from_str(raw).map_err(|e| AtlasError::FormatError(e.to_string()))?;
        let version = parsed
            .version
            .ok_or_else(|| AtlasError::FormatError("missing 'version'".to_string()))?;
        if version != SCHEMA_VERSION {
            return Err(AtlasError::FormatError(format!(
                "unsupported manifest version '{}' (expected '{}')",
                version, SCHEMA_VERSION
            )));
        }
        let features = parsed.features.unwrap_or_default();
        for (id, record) in &features {
            validate_entry(id, record)?;
        }
        Ok(Self { version, features })
    }

    pub fn to_yaml(&self) -> Result<String, AtlasError> {
        serde_yaml::to_string(self)
            .map_err(|e| AtlasError::FormatError(format!("failed to serialize manifest: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), AtlasError> {
        let yaml = self.to_yaml()?;
        atomic::write_atomic(path, yaml.as_bytes())?;
        debug!(path = %path.display(), features = self.len(), "manifest saved");
        Ok(())
    }

    /// [`Manifest::save`] while holding the advisory lock for `path`.
    pub fn save_with_lock(&self, path: &Path, policy: &LockPolicy) -> Result<(), AtlasError> {
        let _guard = policy.guard(path)?;
        self.save(path)
    }

    pub fn add_feature(&mut self, new: NewFeature<'_>) -> Result<(), AtlasError> {
        if new.name.trim().is_empty() {
            return Err(AtlasError::EmptyName);
        }
        if new.summary.trim().is_empty() {
            return Err(AtlasError::EmptySummary);
        }
        ids::validate_local(new.id)?;
        if self.features.contains_key(new.id) {
            return Err(AtlasError::IdExists(new.id.to_string()));
        }
        if let Some(server_id) = self.find_by_alias(new.id) {
            return Err(AtlasError::IdExists(format!(
                "{} (already promoted to {})",
                new.id, server_id
            )));
        }
        self.features.insert(
            new.id.to_string(),
            FeatureRecord::unsynced(new.name, new.summary, new.owner, new.tags),
        );
        Ok(())
    }

    pub fn get_feature(&self, id: &str) -> Option<&FeatureRecord> {
        self.features.get(id)
    }

    pub fn has_feature(&self, id: &str) -> bool {
        self.features.contains_key(id)
    }

    /// Server identifier of the record promoted from `local_id`, if any.
    pub fn find_by_alias(&self, local_id: &str) -> Option<&str> {
        self.features
            .iter()
            .find(|(_, r)| r.alias.as_deref() == Some(local_id))
            .map(|(id, _)| id.as_str())
    }

    /// An independent copy of the records, optionally only the unsynced ones.
    pub fn list_features(&self, unsynced_only: bool) -> BTreeMap<String, FeatureRecord> {
        self.features
            .iter()
            .filter(|(_, r)| !unsynced_only || !r.synced)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Replace an unsynced record wholesale. Promoted records are immutable.
    pub fn replace_feature(&mut self, id: &str, record: FeatureRecord) -> Result<(), AtlasError> {
        let Some(existing) = self.features.get(id) else {
            return Err(AtlasError::NotFound(format!("feature {}", id)));
        };
        if existing.synced {
            return Err(AtlasError::Conflict(format!(
                "{} is synced and can no longer be edited locally",
                id
            )));
        }
        if record.name.trim().is_empty() {
            return Err(AtlasError::EmptyName);
        }
        if record.summary.trim().is_empty() {
            return Err(AtlasError::EmptySummary);
        }
        if record.synced || record.synced_at.is_some() || record.alias.is_some() {
            return Err(AtlasError::Conflict(format!(
                "replacement for {} must not carry sync metadata",
                id
            )));
        }
        self.features.insert(id.to_string(), record);
        Ok(())
    }

    /// Retire the local record `local_id` and re-key it under `server_id`.
    pub fn promote(
        &mut self,
        local_id: &str,
        server_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<&FeatureRecord, AtlasError> {
        if !ids::validate_server(server_id) {
            return Err(AtlasError::InvalidFormat(format!(
                "'{}' is not a server identifier",
                server_id
            )));
        }
        if self.features.contains_key(server_id) {
            return Err(AtlasError::Conflict(format!(
                "{} is already present in the manifest",
                server_id
            )));
        }
        let mut record = match self.features.get(local_id) {
            None => return Err(AtlasError::NotFound(format!("feature {}", local_id))),
            Some(r) if r.synced || !ids::is_local(local_id) => {
                return Err(AtlasError::Conflict(format!("{} is already synced", local_id)));
            }
            Some(r) => r.clone(),
        };
        self.features.remove(local_id);
        record.synced = true;
        record.synced_at = Some(synced_at);
        record.alias = Some(local_id.to_string());
        Ok(self.features.entry(server_id.to_string()).or_insert(record))
    }
}

fn validate_entry(id: &str, record: &FeatureRecord) -> Result<(), AtlasError> {
    let invalid = |msg: String| Err(AtlasError::FormatError(format!("{}: {}", id, msg)));

    if record.name.trim().is_empty() {
        return invalid("empty name".to_string());
    }
    if record.summary.trim().is_empty() {
        return invalid("empty summary".to_string());
    }
    if ids::is_local(id) {
        if let Err(e) = ids::validate_local(id) {
            return invalid(e.to_string());
        }
        if record.synced || record.synced_at.is_some() || record.alias.is_some() {
            return invalid("local record carries sync metadata".to_string());
        }
    } else if ids::validate_server(id) {
        if !record.synced {
            return invalid("server-keyed record must be synced".to_string());
        }
        if record.synced_at.is_none() {
            return invalid("synced record is missing synced_at".to_string());
        }
        if let Some(alias) = &record.alias
            && ids::validate_local(alias).is_err()
        {
            return invalid(format!("alias '{}' is not a local identifier", alias));
        }
    } else {
        return invalid("key is neither a local nor a server identifier".to_string());
    }
    Ok(())
}

/// Load `path` under its advisory lock, apply `f`, and save before unlocking.
///
/// Nothing is written when `f` fails.
pub fn update_locked<R>(
    path: &Path,
    policy: &LockPolicy,
    f: impl FnOnce(&mut Manifest) -> Result<R, AtlasError>,
) -> Result<R, AtlasError> {
    let _guard = policy.guard(path)?;
    let mut manifest = Manifest::load(path)?;
    let out = f(&mut manifest)?;
    manifest.save(path)?;
    Ok(out)
}
