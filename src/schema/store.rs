//! Declarative schema store loaded once at startup
//!
//! - Definitions live in a single JSON file: `{"version": "...", "collections": [...]}`
//! - Collections keep their declaration order (drift scans iterate in that order)
//! - Any definition problem is a configuration error and aborts startup
//! - The store is read-only after load; evolving it is a human-applied migration

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

use super::types::CollectionSchema;

/// On-disk form of the whole schema store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub version: String,
    pub collections: Vec<CollectionSchema>,
}

/// Read-only registry of declared collection schemas.
#[derive(Debug, Clone)]
pub struct SchemaStore {
    source: Option<PathBuf>,
    version: String,
    collections: Vec<CollectionSchema>,
    /// Collection name -> position in `collections`
    by_name: HashMap<String, usize>,
    /// Remote id -> position in `collections`
    by_remote_id: HashMap<String, usize>,
}

impl SchemaStore {
    /// Loads the definition file at `path`.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!(
                "failed to read schema definitions '{}': {}",
                path.display(),
                e
            ))
        })?;

        let definition: SchemaDefinition = serde_json::from_str(&content).map_err(|e| {
            EngineError::Configuration(format!(
                "invalid schema definitions '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut store = Self::from_definition(definition)?;
        store.source = Some(path.to_path_buf());
        Ok(store)
    }

    pub fn from_definition(definition: SchemaDefinition) -> EngineResult<Self> {
        let mut by_name = HashMap::new();
        let mut by_remote_id = HashMap::new();

        for (position, collection) in definition.collections.iter().enumerate() {
            collection
                .validate_structure()
                .map_err(EngineError::Configuration)?;

            if by_name.insert(collection.name.clone(), position).is_some() {
                return Err(EngineError::Configuration(format!(
                    "collection '{}' is declared more than once",
                    collection.name
                )));
            }

            if let Some(previous) = by_remote_id.insert(collection.remote_id.clone(), position) {
                return Err(EngineError::Configuration(format!(
                    "collections '{}' and '{}' share remote id '{}'",
                    definition.collections[previous].name, collection.name, collection.remote_id
                )));
            }
        }

        Ok(Self {
            source: None,
            version: definition.version,
            collections: definition.collections,
            by_name,
            by_remote_id,
        })
    }

    /// Builds a store from in-memory collections (tests, programmatic setup).
    pub fn from_collections(collections: Vec<CollectionSchema>) -> EngineResult<Self> {
        Self::from_definition(SchemaDefinition {
            version: String::new(),
            collections,
        })
    }

    /// Gets a collection by its application-facing name.
    pub fn get(&self, name: &str) -> EngineResult<&CollectionSchema> {
        self.by_name
            .get(name)
            .map(|&i| &self.collections[i])
            .ok_or_else(|| EngineError::SchemaNotFound(name.to_string()))
    }

    pub fn get_by_remote_id(&self, remote_id: &str) -> Option<&CollectionSchema> {
        self.by_remote_id.get(remote_id).map(|&i| &self.collections[i])
    }

    /// Collections in declaration order.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionSchema> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// File the store was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Full definition, suitable for backup snapshots.
    pub fn to_definition(&self) -> SchemaDefinition {
        SchemaDefinition {
            version: self.version.clone(),
            collections: self.collections.clone(),
        }
    }
}
