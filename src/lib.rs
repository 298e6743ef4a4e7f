//! feature-atlas: a local-first feature catalog
//!
//! Features are minted offline under local identifiers (`FT-LOCAL-<slug>`) in a
//! YAML manifest that lives in the repository, and later promoted into the
//! registry's centrally numbered identifier space (`FT-NNNNNN`). A promoted
//! record keeps its former local identifier as `alias`.
//!
//! # Guarantees
//!
//! - **Atomic persistence**: the manifest on disk is always either the previous
//!   or the new fully written state.
//! - **Cross-process exclusion**: writers serialize on an advisory lock with a
//!   bounded wait instead of racing.
//! - **One-way migration**: only local records are promoted; server identifiers
//!   and aliases never change once written.
//! - **Partial-failure isolation**: one failed registry call never aborts the
//!   rest of a sync, and each promotion is checkpointed to disk on its own.
//!
//! # Examples
//!
//! ```bash
//! feature-atlas init
//! feature-atlas add "Auth" --summary "Authentication flow" --owner Security --tags auth,security
//! feature-atlas sync --dry-run
//! feature-atlas sync --registry /srv/feature-registry
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: identifiers, manifest, atomic writes, locking, discovery, config
//! - [`plugins`]: feature commands, the registry boundary and the sync engine

mod cli;
pub mod core;
pub mod plugins;

use crate::cli::{Cli, Command, OutputFormat};
use crate::core::config::AtlasConfig;
use crate::core::discovery::{self, DEFAULT_MANIFEST_NAME};
use crate::core::error::AtlasError;
use crate::core::{output, time};
use crate::plugins::catalog::{self, CatalogQuery, DirectoryCatalog};
use crate::plugins::features::{self, AddParams, EditParams};
use crate::plugins::sync::{self, SyncEngine, SyncReport};

use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FEATURE_ATLAS_LOG";

/// Exit status when a sync finished but some features failed to promote.
const EXIT_PARTIAL_SYNC: u8 = 2;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_json(cmd: &str, status: &str, extra: serde_json::Value) {
    println!("{}", time::command_envelope(cmd, status, extra));
}

fn open_registry(
    config: &AtlasConfig,
    flag: Option<&Path>,
) -> Result<DirectoryCatalog, AtlasError> {
    let path = config.registry_path(flag).ok_or_else(|| {
        AtlasError::ConfigError(
            "no registry configured: pass --registry, set FEATURE_ATLAS_REGISTRY, or add [registry] path to .feature-atlas.toml".to_string(),
        )
    })?;
    DirectoryCatalog::with_lock_policy(&path, config.lock_policy())
}

/// Discover the manifest and load the settings that sit next to it.
fn open_manifest(explicit: Option<&Path>, cwd: &Path) -> Result<(PathBuf, AtlasConfig), AtlasError> {
    let path = discovery::discover(explicit, cwd)?;
    let config = AtlasConfig::load_for_manifest(&path)?;
    Ok((path, config))
}

/// Registry queries work without a manifest; one only contributes settings.
fn query_config(explicit: Option<&Path>, cwd: &Path) -> Result<AtlasConfig, AtlasError> {
    match open_manifest(explicit, cwd) {
        Ok((_, config)) => Ok(config),
        Err(AtlasError::NotFound(_)) if explicit.is_none() => Ok(AtlasConfig::default()),
        Err(e) => Err(e),
    }
}

fn render_sync_report(report: &SyncReport) {
    if report.dry_run {
        for c in &report.candidates {
            println!("would sync {:<20} {}", c.local_id, c.name);
        }
    }
    for p in &report.succeeded {
        println!("{} {} -> {}", "synced".green(), p.local_id, p.server_id);
    }
    for f in &report.failed {
        println!("{} {}: {}", "failed".red(), f.local_id, output::compact_line(&f.reason, 120));
    }
    println!("{}", report.summary_line());
}

pub fn run() -> Result<ExitCode, AtlasError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cwd = std::env::current_dir()?;
    let json = cli.format == OutputFormat::Json;

    let explicit = cli.manifest.as_deref();

    match cli.command {
        Command::Init { force } => {
            let path = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.join(DEFAULT_MANIFEST_NAME));
            let config = AtlasConfig::load_for_manifest(&path)?;
            features::init_manifest(&path, &config.lock_policy(), force)?;
            if json {
                print_json("init", "ok", serde_json::json!({ "manifest": path }));
            } else {
                println!("Initialized {}", path.display());
            }
        }
        Command::Schema => {
            let schema = serde_json::json!({
                "subsystems": [features::schema(), sync::schema(), catalog::schema()]
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&schema)
                    .map_err(|e| AtlasError::FormatError(e.to_string()))?
            );
        }
        Command::Add {
            name,
            summary,
            id,
            owner,
            tags,
        } => {
            let (manifest_path, config) = open_manifest(explicit, &cwd)?;
            let policy = config.lock_policy();
            let id = features::add_feature(
                &manifest_path,
                &policy,
                AddParams {
                    id: id.as_deref(),
                    name: &name,
                    summary: &summary,
                    owner: owner.as_deref(),
                    tags: &tags,
                },
            )?;
            if json {
                print_json("add", "ok", serde_json::json!({ "id": id }));
            } else {
                println!("Added {}", id);
            }
        }
        Command::List { unsynced } => {
            let (manifest_path, _) = open_manifest(explicit, &cwd)?;
            let records = features::list_features(&manifest_path, unsynced)?;
            if json {
                print_json(
                    "list",
                    "ok",
                    serde_json::json!({ "count": records.len(), "features": records }),
                );
            } else if records.is_empty() {
                println!("No features.");
            } else {
                for (id, record) in &records {
                    println!("{}", output::feature_line(id, record));
                }
            }
        }
        Command::Show { id } => {
            let (manifest_path, _) = open_manifest(explicit, &cwd)?;
            let (id, record) = features::show_feature(&manifest_path, &id)?;
            if json {
                print_json("show", "ok", serde_json::json!({ "id": id, "feature": record }));
            } else {
                println!("{}", output::feature_line(&id, &record));
                if let Some(owner) = &record.owner {
                    println!("  owner:     {}", owner);
                }
                if !record.tags.is_empty() {
                    let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
                    println!("  tags:      {}", tags.join(", "));
                }
                if let Some(ts) = &record.synced_at {
                    println!("  synced at: {}", time::format_ts(ts));
                }
                if let Some(alias) = &record.alias {
                    println!("  alias:     {}", alias);
                }
            }
        }
        Command::Edit {
            id,
            name,
            summary,
            owner,
            tags,
        } => {
            let (manifest_path, config) = open_manifest(explicit, &cwd)?;
            let policy = config.lock_policy();
            let record = features::edit_feature(
                &manifest_path,
                &policy,
                &id,
                EditParams {
                    name: name.as_deref(),
                    summary: summary.as_deref(),
                    owner: owner.as_deref(),
                    tags: tags.as_deref(),
                },
            )?;
            if json {
                print_json("edit", "ok", serde_json::json!({ "id": id, "feature": record }));
            } else {
                println!("Updated {}", id);
            }
        }
        Command::Sync { dry_run, registry } => {
            let (manifest_path, config) = open_manifest(explicit, &cwd)?;
            let report = if dry_run {
                sync::plan(&manifest_path)?
            } else {
                let policy = config.lock_policy();
                let client = Arc::new(open_registry(&config, registry.as_deref())?);
                SyncEngine::new(client, &policy, config.remote_timeout()).run(&manifest_path)?
            };
            if json {
                let status = if report.is_clean() { "ok" } else { "partial" };
                print_json("sync", status, serde_json::json!({ "report": report }));
            } else {
                render_sync_report(&report);
            }
            if !report.is_clean() {
                return Ok(ExitCode::from(EXIT_PARTIAL_SYNC));
            }
        }
        Command::Search {
            query,
            limit,
            registry,
        } => {
            let config = query_config(explicit, &cwd)?;
            let found = open_registry(&config, registry.as_deref())?.search(&query, limit)?;
            if json {
                print_json("search", "ok", serde_json::json!({ "results": found }));
            } else {
                for f in &found {
                    println!("{:<10} {}: {}", f.id, f.name.bold(), output::compact_line(&f.summary, 72));
                }
            }
        }
        Command::Suggest {
            text,
            limit,
            registry,
        } => {
            let config = query_config(explicit, &cwd)?;
            let found = open_registry(&config, registry.as_deref())?.suggest(&text, limit)?;
            if json {
                print_json("suggest", "ok", serde_json::json!({ "results": found }));
            } else if found.is_empty() {
                println!("No similar features in the registry.");
            } else {
                for f in &found {
                    println!("{:<10} {}", f.id, f.name);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
