//! CLI struct definitions for the feature-atlas command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "feature-atlas",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first feature catalog: mint features offline, promote them into the registry later."
)]
pub(crate) struct Cli {
    /// Manifest to operate on. Skips discovery; the file must exist (except for `init`).
    #[clap(long, global = true)]
    pub manifest: Option<PathBuf>,
    /// Output format: 'text' or 'json'.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    /// Debug logging on stderr (FEATURE_ATLAS_LOG takes precedence).
    #[clap(long, short = 'v', global = true)]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create an empty manifest in the current directory.
    Init {
        /// Overwrite an existing manifest.
        #[clap(long)]
        force: bool,
    },
    /// Add a local feature.
    Add {
        /// Feature name (positional argument)
        #[clap(value_name = "NAME")]
        name: String,
        #[clap(long)]
        summary: String,
        /// Local identifier (FT-LOCAL-<slug>). Derived from the name if omitted.
        #[clap(long)]
        id: Option<String>,
        #[clap(long)]
        owner: Option<String>,
        /// Comma-separated tags.
        #[clap(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// List features in the manifest.
    List {
        /// Only features not yet promoted.
        #[clap(long)]
        unsynced: bool,
    },
    /// Show one feature. Former local ids resolve to their promoted record.
    Show {
        #[clap(value_name = "ID")]
        id: String,
    },
    /// Replace fields of an unsynced feature.
    Edit {
        #[clap(value_name = "ID")]
        id: String,
        #[clap(long)]
        name: Option<String>,
        #[clap(long)]
        summary: Option<String>,
        /// Empty string clears the owner.
        #[clap(long)]
        owner: Option<String>,
        #[clap(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    /// Promote unsynced features into the registry.
    Sync {
        /// Report what would be promoted without contacting the registry or writing.
        #[clap(long)]
        dry_run: bool,
        #[clap(long)]
        registry: Option<PathBuf>,
    },
    /// Search the registry.
    Search {
        #[clap(value_name = "QUERY")]
        query: String,
        #[clap(long, default_value_t = 20)]
        limit: usize,
        #[clap(long)]
        registry: Option<PathBuf>,
    },
    /// Registry features similar to the given text.
    Suggest {
        #[clap(value_name = "TEXT")]
        text: String,
        #[clap(long, default_value_t = 5)]
        limit: usize,
        #[clap(long)]
        registry: Option<PathBuf>,
    },
    /// Print the command/storage schema of every subsystem as JSON.
    Schema,
}
