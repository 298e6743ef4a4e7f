//! Identifier namespaces.
//!
//! Local identifiers (`FT-LOCAL-<slug>`) are minted offline and live only until
//! promotion. Server identifiers (`FT-NNNNNN`) are allocated by the registry.

use crate::core::error::AtlasError;
use regex::Regex;
use std::sync::OnceLock;

pub const LOCAL_PREFIX: &str = "FT-LOCAL-";
pub const SERVER_PREFIX: &str = "FT-";
pub const MAX_LOCAL_SUFFIX_LEN: usize = 64;
/// Largest number representable in the six-digit server namespace.
pub const MAX_SERVER_NUMBER: u32 = 999_999;

fn local_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").unwrap())
}

fn server_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^FT-[0-9]{6}$").unwrap())
}

pub fn validate_local(id: &str) -> Result<(), AtlasError> {
    if id.is_empty() {
        return Err(AtlasError::InvalidFormat("identifier is empty".to_string()));
    }
    let Some(suffix) = id.strip_prefix(LOCAL_PREFIX) else {
        return Err(AtlasError::InvalidFormat(format!(
            "'{}' must start with {}",
            id, LOCAL_PREFIX
        )));
    };
    if suffix.is_empty() || suffix.len() > MAX_LOCAL_SUFFIX_LEN {
        return Err(AtlasError::InvalidFormat(format!(
            "'{}' suffix must be 1-{} characters",
            id, MAX_LOCAL_SUFFIX_LEN
        )));
    }
    if !local_suffix_re().is_match(suffix) {
        return Err(AtlasError::InvalidFormat(format!(
            "'{}' suffix may only contain [a-z0-9-] and must not start or end with '-'",
            id
        )));
    }
    Ok(())
}

pub fn validate_server(id: &str) -> bool {
    server_re().is_match(id)
}

/// Namespace router: prefix test only, the suffix is not inspected.
pub fn is_local(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

pub fn format_server(number: u32) -> Result<String, AtlasError> {
    if number == 0 || number > MAX_SERVER_NUMBER {
        return Err(AtlasError::InvalidFormat(format!(
            "server number {} is outside 1..={}",
            number, MAX_SERVER_NUMBER
        )));
    }
    Ok(format!("{}{:06}", SERVER_PREFIX, number))
}

pub fn parse_server(id: &str) -> Option<u32> {
    if !validate_server(id) {
        return None;
    }
    id[SERVER_PREFIX.len()..].parse().ok()
}

/// Derive a local identifier from a human label, e.g. "OAuth Login" -> `FT-LOCAL-oauth-login`.
pub fn local_id_from_name(name: &str) -> Result<String, AtlasError> {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let mut slug = slug.trim_matches('-').to_string();
    if slug.len() > MAX_LOCAL_SUFFIX_LEN {
        slug.truncate(MAX_LOCAL_SUFFIX_LEN);
        slug = slug.trim_end_matches('-').to_string();
    }
    let id = format!("{}{}", LOCAL_PREFIX, slug);
    validate_local(&id)?;
    Ok(id)
}
