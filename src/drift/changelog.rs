//! Append-only change log
//!
//! - One JSON-encoded [`Change`] per line
//! - Each batch is flushed and synced before `append` returns
//! - No deduplication: the same drift observed twice is logged twice
//! - Never rewritten or truncated

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{EngineError, EngineResult};
use crate::observability::{Event, Logger};

use super::change::Change;

/// JSON Lines change history on disk
#[derive(Debug)]
pub struct ChangeLog {
    path: PathBuf,
    // Serializes appends from concurrent scans in one process.
    lock: Mutex<()>,
}

impl ChangeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `changes` as one synced batch. An empty batch touches nothing.
    pub fn append(&self, changes: &[Change]) -> EngineResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let err = |e: &dyn std::fmt::Display| EngineError::local_state(self.path.display().to_string(), e);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| err(&e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| err(&e))?;

        let mut writer = BufWriter::new(file);
        for change in changes {
            let line = serde_json::to_string(change).map_err(|e| err(&e))?;
            writeln!(writer, "{}", line).map_err(|e| err(&e))?;
        }
        writer.flush().map_err(|e| err(&e))?;
        writer.get_ref().sync_all().map_err(|e| err(&e))?;

        Logger::info(
            Event::ChangesAppended,
            &[
                ("count", &changes.len().to_string()),
                ("path", &self.path.display().to_string()),
            ],
        );
        Ok(())
    }

    /// Full history, oldest first. A missing file is an empty history.
    pub fn read_all(&self) -> EngineResult<Vec<Change>> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::local_state(self.path.display().to_string(), e)),
        };

        let mut changes = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .map_err(|e| EngineError::local_state(self.path.display().to_string(), e))?;
            if line.trim().is_empty() {
                continue;
            }
            let change = serde_json::from_str(&line).map_err(|e| {
                EngineError::local_state(
                    self.path.display().to_string(),
                    format!("line {}: {}", index + 1, e),
                )
            })?;
            changes.push(change);
        }
        Ok(changes)
    }
}
