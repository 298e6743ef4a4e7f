//! Command subsystems built on the core manifest.

pub mod catalog;
pub mod features;
pub mod sync;
