//! Schema store backup snapshots
//!
//! A full copy of the declared definitions is written before every drift
//! scan so a human-applied migration can always be reverted.
//!
//! Location: `<backup_dir>/schema_backup_<YYYYMMDDTHHMMSSZ>_<run>.json`
//!
//! The snapshot records a SHA-256 digest of the canonical JSON encoding of
//! the definitions; loading a snapshot re-checks the digest.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};

use super::store::{SchemaDefinition, SchemaStore};

/// Backup format version
const FORMAT_VERSION: u8 = 1;

/// A persisted snapshot of every declared collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaBackup {
    pub format_version: u8,
    pub created_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub collection_count: usize,
    /// Hex SHA-256 of the canonical definition JSON
    pub digest: String,
    pub definition: SchemaDefinition,
}

impl SchemaBackup {
    pub fn capture(store: &SchemaStore, run_id: Uuid, created_at: DateTime<Utc>) -> EngineResult<Self> {
        let definition = store.to_definition();
        let digest = definition_digest(&definition)?;

        Ok(Self {
            format_version: FORMAT_VERSION,
            created_at,
            run_id,
            collection_count: definition.collections.len(),
            digest,
            definition,
        })
    }

    /// File name for this snapshot
    pub fn file_name(&self) -> String {
        let run = self.run_id.simple().to_string();
        format!(
            "schema_backup_{}_{}.json",
            self.created_at.format("%Y%m%dT%H%M%SZ"),
            &run[..8]
        )
    }

    /// Writes the snapshot into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> EngineResult<PathBuf> {
        fs::create_dir_all(dir)
            .map_err(|e| EngineError::local_state(dir.display().to_string(), e))?;

        let path = dir.join(self.file_name());
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::local_state(path.display().to_string(), e))?;

        fs::write(&path, content)
            .map_err(|e| EngineError::local_state(path.display().to_string(), e))?;

        Ok(path)
    }

    /// Reads a snapshot and verifies its digest.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| EngineError::local_state(path.display().to_string(), e))?;

        let backup: SchemaBackup = serde_json::from_str(&content)
            .map_err(|e| EngineError::local_state(path.display().to_string(), e))?;

        let actual = definition_digest(&backup.definition)?;
        if actual != backup.digest {
            return Err(EngineError::local_state(
                path.display().to_string(),
                format!("digest mismatch: recorded {}, computed {}", backup.digest, actual),
            ));
        }

        Ok(backup)
    }
}

fn definition_digest(definition: &SchemaDefinition) -> EngineResult<String> {
    let bytes = serde_json::to_vec(definition)
        .map_err(|e| EngineError::local_state("<schema definition>", e))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
