//! Compact output rendering helpers for CLI surfaces.

use crate::core::manifest::FeatureRecord;
use colored::Colorize;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Join identifiers for a one-line digest, naming at most `max_items` of them.
pub fn id_digest<S: AsRef<str>>(ids: &[S], max_items: usize) -> String {
    let shown = ids
        .iter()
        .take(max_items)
        .map(|id| id.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    match ids.len().saturating_sub(max_items) {
        0 => shown,
        hidden => format!("{} and {} more", shown, hidden),
    }
}

/// One listing row: `<id>  <state>  <name>: <summary>`.
pub fn feature_line(id: &str, record: &FeatureRecord) -> String {
    let state = if record.synced {
        "synced".green()
    } else {
        "local".yellow()
    };
    format!(
        "{:<20} {:<6} {}: {}",
        id,
        state,
        record.name.bold(),
        compact_line(&record.summary, 72)
    )
}
