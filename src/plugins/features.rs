use crate::core::error::AtlasError;
use crate::core::ids;
use crate::core::lock::LockPolicy;
use crate::core::manifest::{self, FeatureRecord, Manifest, NewFeature, normalize_tags};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub struct AddParams<'a> {
    /// Explicit local identifier; derived from `name` when absent.
    pub id: Option<&'a str>,
    pub name: &'a str,
    pub summary: &'a str,
    pub owner: Option<&'a str>,
    pub tags: &'a [String],
}

#[derive(Default)]
pub struct EditParams<'a> {
    pub name: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub owner: Option<&'a str>,
    pub tags: Option<&'a [String]>,
}

/// Create an empty manifest at `path`. Refuses to clobber one unless `force`.
pub fn init_manifest(path: &Path, policy: &LockPolicy, force: bool) -> Result<(), AtlasError> {
    if path.exists() && !force {
        return Err(AtlasError::Conflict(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Manifest::new().save_with_lock(path, policy)?;
    info!(path = %path.display(), "manifest initialized");
    Ok(())
}

/// Add a local feature and persist it. Returns the identifier used.
pub fn add_feature(
    path: &Path,
    policy: &LockPolicy,
    params: AddParams<'_>,
) -> Result<String, AtlasError> {
    if params.name.trim().is_empty() {
        return Err(AtlasError::EmptyName);
    }
    // Slug derivation can fail on its own; a blank summary must be reported first.
    if params.summary.trim().is_empty() {
        return Err(AtlasError::EmptySummary);
    }
    let id = match params.id {
        Some(id) => id.to_string(),
        None => ids::local_id_from_name(params.name)?,
    };
    manifest::update_locked(path, policy, |m| {
        m.add_feature(NewFeature {
            id: &id,
            name: params.name,
            summary: params.summary,
            owner: params.owner,
            tags: params.tags,
        })
    })?;
    info!(id = %id, "feature added");
    Ok(id)
}

pub fn list_features(
    path: &Path,
    unsynced_only: bool,
) -> Result<BTreeMap<String, FeatureRecord>, AtlasError> {
    Ok(Manifest::load(path)?.list_features(unsynced_only))
}

/// Look up `id`, following the alias of a promoted record when given its old local id.
pub fn show_feature(path: &Path, id: &str) -> Result<(String, FeatureRecord), AtlasError> {
    let manifest = Manifest::load(path)?;
    if let Some(record) = manifest.get_feature(id) {
        return Ok((id.to_string(), record.clone()));
    }
    if ids::is_local(id)
        && let Some(server_id) = manifest.find_by_alias(id)
        && let Some(record) = manifest.get_feature(server_id)
    {
        return Ok((server_id.to_string(), record.clone()));
    }
    Err(AtlasError::NotFound(format!("feature {}", id)))
}

pub fn edit_feature(
    path: &Path,
    policy: &LockPolicy,
    id: &str,
    params: EditParams<'_>,
) -> Result<FeatureRecord, AtlasError> {
    manifest::update_locked(path, policy, |m| {
        let Some(current) = m.get_feature(id) else {
            return Err(AtlasError::NotFound(format!("feature {}", id)));
        };
        let mut next = current.clone();
        if let Some(name) = params.name {
            next.name = name.trim().to_string();
        }
        if let Some(summary) = params.summary {
            next.summary = summary.trim().to_string();
        }
        if let Some(owner) = params.owner {
            let owner = owner.trim();
            next.owner = (!owner.is_empty()).then(|| owner.to_string());
        }
        if let Some(tags) = params.tags {
            next.tags = normalize_tags(tags);
        }
        m.replace_feature(id, next.clone())?;
        Ok(next)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "features",
        "version": "0.1.0",
        "description": "Local feature manifest",
        "commands": [
            { "name": "init", "parameters": ["force"] },
            { "name": "add", "parameters": ["name", "summary", "id", "owner", "tags"] },
            { "name": "list", "parameters": ["unsynced"] },
            { "name": "show", "parameters": ["id"] },
            { "name": "edit", "parameters": ["id", "name", "summary", "owner", "tags"] }
        ],
        "storage": [".feature-atlas.yaml", ".feature-atlas.yaml.lock"]
    })
}
