//! Migration stub generation
//!
//! Turns detected drift into a human-readable draft of edits to the schema
//! definition. The draft is written to disk for review and is never applied.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::errors::{EngineError, EngineResult};
use crate::observability::{Event, Logger};

use super::change::{Change, ChangeType};

/// Renders `changes` as pseudo-Rust edits grouped by collection.
///
/// Additive drift becomes statements; removals are commented out as items for
/// manual review.
pub fn generate_migration_stub(changes: &[Change], generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "// Schema migration draft generated {}\n",
        generated_at.format("%Y-%m-%dT%H:%M:%SZ")
    ));
    out.push_str("// Review every edit before applying it to the schema definition.\n");

    if changes.is_empty() {
        out.push_str("\n// No drift detected.\n");
        return out;
    }

    let mut by_collection: BTreeMap<&str, Vec<&Change>> = BTreeMap::new();
    for change in changes {
        by_collection
            .entry(change.collection.as_str())
            .or_default()
            .push(change);
    }

    for (collection, mut items) in by_collection {
        items.sort_by_key(|c| c.change_type);
        out.push_str(&format!("\n// == {} ==\n", collection));
        for change in items {
            out.push_str(&render(collection, change));
            out.push('\n');
        }
    }
    out
}

fn render(collection: &str, change: &Change) -> String {
    let var = ident(collection);
    match change.change_type {
        ChangeType::NewField => format!(
            "{}.add_field({:?}, FieldType::from({:?}));",
            var, change.field_name, change.new_value
        ),
        ChangeType::NewEnumValue => format!(
            "{}.add_option({:?}, {:?});",
            var, change.field_name, change.new_value
        ),
        ChangeType::RemovedField => format!(
            "// REVIEW: {}.remove_field({:?}); // was {}",
            var,
            change.field_name,
            change.old_value.as_deref().unwrap_or("unknown")
        ),
        ChangeType::RemovedEnumValue => format!(
            "// REVIEW: {}.remove_option({:?}, {:?});",
            var,
            change.field_name,
            change.old_value.as_deref().unwrap_or_default()
        ),
    }
}

fn ident(collection: &str) -> String {
    let ident: String = collection
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if ident.chars().next().map_or(true, |c| c.is_numeric()) {
        format!("c_{}", ident)
    } else {
        ident
    }
}

/// Writes the draft to `path`, replacing any previous draft.
pub fn write_migration_stub(path: &Path, stub: &str) -> EngineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::local_state(parent.display().to_string(), e))?;
    }
    fs::write(path, stub).map_err(|e| EngineError::local_state(path.display().to_string(), e))?;
    Logger::info(Event::StubWritten, &[("path", &path.display().to_string())]);
    Ok(())
}
