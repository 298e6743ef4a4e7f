//! Boundary to the authoritative feature registry.
//!
//! [`CatalogClient`] is the only registry operation the sync engine needs.
//! [`CatalogQuery`] is the read side used by the `show`/`search`/`suggest`
//! commands. [`DirectoryCatalog`] implements both over a plain directory, which
//! doubles as the registry for single-host setups and tests.

use crate::core::atomic;
use crate::core::error::AtlasError;
use crate::core::ids;
use crate::core::lock::LockPolicy;
use crate::core::manifest::{FeatureRecord, normalize_tags};
use crate::core::time;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFeatureRequest {
    pub name: String,
    pub summary: String,
    pub owner: Option<String>,
    pub tags: Vec<String>,
}

impl CreateFeatureRequest {
    pub fn from_record(record: &FeatureRecord) -> Self {
        Self {
            name: record.name.clone(),
            summary: record.summary.clone(),
            owner: record.owner.clone(),
            tags: record.tags.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedFeature {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Write side of the registry.
///
/// A returned identifier is treated as reserved for this feature. Registries that
/// gate writes behind review may not have durably stored it yet.
pub trait CatalogClient: Send + Sync {
    fn create_feature(&self, request: &CreateFeatureRequest) -> Result<CreatedFeature, AtlasError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryFeature {
    pub id: String,
    pub name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

pub trait CatalogQuery {
    fn get_feature(&self, id: &str) -> Result<Option<RegistryFeature>, AtlasError>;

    fn feature_exists(&self, id: &str) -> Result<bool, AtlasError> {
        Ok(self.get_feature(id)?.is_some())
    }

    /// Case-insensitive substring match over id, name, summary and tags.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<RegistryFeature>, AtlasError>;

    /// Registry features that share words with `text`, best match first.
    fn suggest(&self, text: &str, limit: usize) -> Result<Vec<RegistryFeature>, AtlasError>;
}

/// File-backed registry.
///
/// ```text
/// <root>/sequence              highest server number ever allocated
/// <root>/sequence.lock         advisory lock serializing allocations
/// <root>/features/FT-000001.yaml
/// ```
///
/// The sequence is bumped before the feature file is written, so a crash in
/// between leaves a gap rather than a reusable number.
#[derive(Debug)]
pub struct DirectoryCatalog {
    root: PathBuf,
    lock: LockPolicy,
}

impl DirectoryCatalog {
    pub fn open(root: &Path) -> Result<Self, AtlasError> {
        Self::with_lock_policy(root, LockPolicy::default())
    }

    pub fn with_lock_policy(root: &Path, lock: LockPolicy) -> Result<Self, AtlasError> {
        fs::create_dir_all(root.join("features"))?;
        Ok(Self {
            root: root.to_path_buf(),
            lock,
        })
    }

    fn sequence_path(&self) -> PathBuf {
        self.root.join("sequence")
    }

    fn feature_path(&self, id: &str) -> PathBuf {
        self.root.join("features").join(format!("{}.yaml", id))
    }

    fn read_sequence(&self) -> Result<u32, AtlasError> {
        match fs::read_to_string(self.sequence_path()) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                AtlasError::RemoteError(format!(
                    "registry sequence {} is corrupt",
                    self.sequence_path().display()
                ))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(AtlasError::IoError(e)),
        }
    }

    fn highest_stored(&self) -> Result<u32, AtlasError> {
        let mut highest = 0;
        for entry in fs::read_dir(self.root.join("features"))? {
            let path = entry?.path();
            if let Some(n) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(ids::parse_server)
            {
                highest = highest.max(n);
            }
        }
        Ok(highest)
    }

    pub fn all_features(&self) -> Result<Vec<RegistryFeature>, AtlasError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.root.join("features"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            out.push(read_feature_file(&path)?);
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}

fn read_feature_file(path: &Path) -> Result<RegistryFeature, AtlasError> {
    let raw = fs::read_to_string(path)?;
    serde_yaml::from_str(&raw)
        .map_err(|e| AtlasError::RemoteError(format!("{}: {}", path.display(), e)))
}

impl CatalogClient for DirectoryCatalog {
    fn create_feature(&self, request: &CreateFeatureRequest) -> Result<CreatedFeature, AtlasError> {
        if request.name.trim().is_empty() {
            return Err(AtlasError::EmptyName);
        }
        if request.summary.trim().is_empty() {
            return Err(AtlasError::EmptySummary);
        }

        let _guard = self.lock.guard(&self.sequence_path())?;
        let last = self.read_sequence()?.max(self.highest_stored()?);
        let next = last
            .checked_add(1)
            .filter(|n| *n <= ids::MAX_SERVER_NUMBER)
            .ok_or_else(|| AtlasError::RemoteError("server identifier space exhausted".to_string()))?;
        let id = ids::format_server(next)?;
        atomic::write_atomic(&self.sequence_path(), format!("{}\n", next).as_bytes())?;

        let feature = RegistryFeature {
            id: id.clone(),
            name: request.name.trim().to_string(),
            summary: request.summary.trim().to_string(),
            owner: request.owner.clone(),
            tags: normalize_tags(&request.tags),
            created_at: time::now_utc(),
        };
        let yaml = serde_yaml::to_string(&feature)
            .map_err(|e| AtlasError::RemoteError(format!("failed to serialize {}: {}", id, e)))?;
        atomic::write_atomic(&self.feature_path(&id), yaml.as_bytes())?;
        info!(id = %id, registry = %self.root.display(), "registry allocated feature");

        Ok(CreatedFeature {
            id,
            created_at: feature.created_at,
        })
    }
}

impl CatalogQuery for DirectoryCatalog {
    fn get_feature(&self, id: &str) -> Result<Option<RegistryFeature>, AtlasError> {
        if !ids::validate_server(id) {
            return Ok(None);
        }
        let path = self.feature_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_feature_file(&path).map(Some)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<RegistryFeature>, AtlasError> {
        let needle = query.trim().to_lowercase();
        Ok(self
            .all_features()?
            .into_iter()
            .filter(|f| {
                needle.is_empty()
                    || f.id.to_lowercase().contains(&needle)
                    || f.name.to_lowercase().contains(&needle)
                    || f.summary.to_lowercase().contains(&needle)
                    || f.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            })
            .take(limit)
            .collect())
    }

    fn suggest(&self, text: &str, limit: usize) -> Result<Vec<RegistryFeature>, AtlasError> {
        let wanted = words(text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, RegistryFeature)> = self
            .all_features()?
            .into_iter()
            .filter_map(|f| {
                let mut have = words(&f.name);
                have.extend(words(&f.summary));
                have.extend(f.tags.iter().map(|t| t.to_lowercase()));
                let score = wanted.intersection(&have).count();
                (score > 0).then_some((score, f))
            })
            .collect();
        scored.sort_by(|(sa, fa), (sb, fb)| sb.cmp(sa).then_with(|| fa.id.cmp(&fb.id)));
        Ok(scored.into_iter().take(limit).map(|(_, f)| f).collect())
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "catalog",
        "version": "0.1.0",
        "description": "Authoritative registry boundary (file-backed implementation)",
        "commands": [
            { "name": "search", "parameters": ["query", "limit"] },
            { "name": "suggest", "parameters": ["text", "limit"] }
        ],
        "storage": ["<registry>/sequence", "<registry>/features/*.yaml"]
    })
}
