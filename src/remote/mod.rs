//! Remote document store boundary
//!
//! The engine talks to the backing store only through [`RemoteStore`]. Every
//! method is a network round-trip; callers bound them with [`with_timeout`].
//!
//! Implementations:
//! - [`NotionClient`]: the Notion REST API
//! - [`MemoryRemote`]: in-process store with call counters and fault injection

mod errors;
mod memory;
mod notion;
mod types;

use async_trait::async_trait;

pub use errors::{with_timeout, RemoteError, RemoteResult};
pub use memory::{CallCounts, MemoryRemote};
pub use notion::{NotionClient, NotionSettings, DEFAULT_API_BASE, DEFAULT_API_VERSION};
pub use types::{Record, RecordFilter, SchemaSnapshot};

use crate::schema::FieldMap;

/// Operations the engine consumes from the backing document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the live schema of a collection.
    async fn get_schema(&self, collection_id: &str) -> RemoteResult<SchemaSnapshot>;

    /// Replace the option list of an enum field.
    ///
    /// Callers only ever pass a superset of the current list.
    async fn patch_schema(
        &self,
        collection_id: &str,
        field: &str,
        options: &[String],
    ) -> RemoteResult<()>;

    /// List records of a collection, optionally filtered.
    async fn query(
        &self,
        collection_id: &str,
        filter: Option<&RecordFilter>,
    ) -> RemoteResult<Vec<Record>>;

    async fn create_record(&self, collection_id: &str, fields: &FieldMap) -> RemoteResult<Record>;

    async fn update_record(&self, record_id: &str, fields: &FieldMap) -> RemoteResult<Record>;

    async fn get_record(&self, record_id: &str) -> RemoteResult<Record>;
}
