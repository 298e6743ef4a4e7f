//! Promotion of local features into the registry's identifier space.
//!
//! Every unsynced record at call time is a candidate. Candidates are processed
//! in identifier order, each independently: a remote failure is reported and
//! the batch moves on, while a successful promotion is written to disk before
//! the next candidate is touched. Interrupting a run therefore leaves a prefix
//! of the candidates promoted and the rest valid local records, and a rerun only
//! picks up the latter.
//!
//! The only batch-fatal condition is being unable to record a promotion that
//! the registry already accepted.

use crate::core::error::AtlasError;
use crate::core::ids;
use crate::core::lock::LockPolicy;
use crate::core::manifest::{self, Manifest};
use crate::core::output;
use crate::core::time;
use crate::plugins::catalog::{CatalogClient, CreateFeatureRequest, CreatedFeature};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub local_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Promotion {
    pub local_id: String,
    pub server_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub local_id: String,
    pub reason: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub candidates: Vec<Candidate>,
    pub succeeded: Vec<Promotion>,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary_line(&self) -> String {
        if self.dry_run {
            return format!("{} feature(s) would be synced", self.candidates.len());
        }
        let line = format!(
            "{} candidate(s): {} synced, {} failed",
            self.candidates.len(),
            self.succeeded.len(),
            self.failed.len()
        );
        if self.failed.is_empty() {
            return line;
        }
        let failed: Vec<&str> = self.failed.iter().map(|f| f.local_id.as_str()).collect();
        format!("{} ({})", line, output::id_digest(&failed, 3))
    }
}

pub struct SyncEngine<'a> {
    client: Arc<dyn CatalogClient>,
    lock: &'a LockPolicy,
    remote_timeout: Duration,
}

impl<'a> SyncEngine<'a> {
    pub fn new(client: Arc<dyn CatalogClient>, lock: &'a LockPolicy, remote_timeout: Duration) -> Self {
        Self {
            client,
            lock,
            remote_timeout,
        }
    }

    pub fn run(&self, manifest_path: &Path) -> Result<SyncReport, AtlasError> {
        let manifest = Manifest::load(manifest_path)?;
        let mut report = SyncReport {
            candidates: candidates(&manifest),
            ..SyncReport::default()
        };

        for (local_id, record) in manifest.list_features(true) {
            let request = CreateFeatureRequest::from_record(&record);
            let created = match self.create_with_deadline(request) {
                Ok(created) => created,
                Err(e) => {
                    warn!(local_id = %local_id, error = %e, "remote creation failed");
                    report.failed.push(failure(&local_id, &e));
                    continue;
                }
            };
            if !ids::validate_server(&created.id) {
                let e = AtlasError::RemoteError(format!(
                    "registry returned malformed identifier '{}'",
                    created.id
                ));
                warn!(local_id = %local_id, error = %e, "remote creation rejected");
                report.failed.push(failure(&local_id, &e));
                continue;
            }

            let synced_at = time::now_utc();
            let checkpoint = manifest::update_locked(manifest_path, self.lock, |m| {
                m.promote(&local_id, &created.id, synced_at).map(|_| ())
            });
            match checkpoint {
                Ok(()) => {
                    info!(local_id = %local_id, server_id = %created.id, "feature promoted");
                    report.succeeded.push(Promotion {
                        local_id,
                        server_id: created.id,
                        created_at: time::format_ts(&created.created_at),
                    });
                }
                // The record changed on disk since this run loaded it; nothing was written.
                Err(e @ (AtlasError::NotFound(_) | AtlasError::Conflict(_))) => {
                    warn!(local_id = %local_id, server_id = %created.id, error = %e, "promotion not recorded");
                    report.failed.push(SyncFailure {
                        local_id,
                        reason: format!(
                            "registry reserved {} but the local record changed concurrently: {}",
                            created.id, e
                        ),
                        retryable: false,
                    });
                }
                Err(e) => {
                    return Err(AtlasError::SyncAborted {
                        local_id,
                        server_id: created.id,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Issue the remote call on a helper thread and stop waiting after `remote_timeout`.
    fn create_with_deadline(
        &self,
        request: CreateFeatureRequest,
    ) -> Result<CreatedFeature, AtlasError> {
        let (tx, rx) = mpsc::channel();
        let client = Arc::clone(&self.client);
        thread::Builder::new()
            .name("catalog-create".to_string())
            .spawn(move || {
                let _ = tx.send(client.create_feature(&request));
            })?;
        match rx.recv_timeout(self.remote_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(AtlasError::RemoteTimeout(self.remote_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(AtlasError::RemoteError(
                "catalog client terminated without a response".to_string(),
            )),
        }
    }
}

/// Dry run: the candidate set and would-be outcome. Touches neither the registry nor the disk.
pub fn plan(manifest_path: &Path) -> Result<SyncReport, AtlasError> {
    let manifest = Manifest::load(manifest_path)?;
    Ok(SyncReport {
        dry_run: true,
        candidates: candidates(&manifest),
        ..SyncReport::default()
    })
}

fn candidates(manifest: &Manifest) -> Vec<Candidate> {
    manifest
        .list_features(true)
        .into_iter()
        .map(|(local_id, record)| Candidate {
            local_id,
            name: record.name,
        })
        .collect()
}

fn failure(local_id: &str, e: &AtlasError) -> SyncFailure {
    SyncFailure {
        local_id: local_id.to_string(),
        reason: e.to_string(),
        retryable: e.is_retryable(),
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "sync",
        "version": "0.1.0",
        "description": "Promote local features to registry identifiers",
        "commands": [
            { "name": "sync", "parameters": ["dry_run", "registry"] }
        ],
        "storage": [".feature-atlas.yaml"]
    })
}
