//! Core modules for the local feature manifest.
//!
//! Identifier namespaces, the manifest record store, crash-safe writes,
//! advisory locking, discovery and configuration live here.

pub mod atomic;
pub mod config;
pub mod discovery;
pub mod error;
pub mod ids;
pub mod lock;
pub mod manifest;
pub mod output;
pub mod time;
