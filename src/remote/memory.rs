//! In-memory remote store
//!
//! Behaves like the real store for schema reads, option patches and record
//! CRUD, counts every call, and can inject the failures the engine has to
//! survive: unavailable collections, rejected writes, lost schema patches,
//! fields blanked by the remote on write, and failing record re-reads.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::schema::FieldMap;

use super::errors::{RemoteError, RemoteResult};
use super::types::{Record, RecordFilter, SchemaSnapshot};
use super::RemoteStore;

/// Number of calls issued per remote operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_schema: usize,
    pub patch_schema: usize,
    pub query: usize,
    pub create_record: usize,
    pub update_record: usize,
    pub get_record: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.get_schema
            + self.patch_schema
            + self.query
            + self.create_record
            + self.update_record
            + self.get_record
    }

    /// Calls that mutate remote state
    pub fn mutations(&self) -> usize {
        self.patch_schema + self.create_record + self.update_record
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    schemas: HashMap<String, SchemaSnapshot>,
    records: BTreeMap<String, Record>,
    next_record: u64,
    calls: CallCounts,
    unavailable: HashSet<String>,
    rejected_writes: Option<String>,
    lose_patches: bool,
    patch_delay: Option<Duration>,
    blank_on_write: HashSet<String>,
    failing_reads: bool,
}

/// In-process [`RemoteStore`].
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, collection_id: impl Into<String>, snapshot: SchemaSnapshot) -> Self {
        self.set_schema(collection_id, snapshot);
        self
    }

    /// Replaces the live schema, as if edited by a human in the remote UI.
    pub fn set_schema(&self, collection_id: impl Into<String>, snapshot: SchemaSnapshot) {
        self.state().schemas.insert(collection_id.into(), snapshot);
    }

    pub fn schema(&self, collection_id: &str) -> Option<SchemaSnapshot> {
        self.state().schemas.get(collection_id).cloned()
    }

    /// Makes every call touching `collection_id` fail with a transport error.
    pub fn set_unavailable(&self, collection_id: impl Into<String>, unavailable: bool) {
        let collection_id = collection_id.into();
        let mut state = self.state();
        if unavailable {
            state.unavailable.insert(collection_id);
        } else {
            state.unavailable.remove(&collection_id);
        }
    }

    /// Rejects record creates and updates with `message`.
    pub fn reject_writes(&self, message: Option<&str>) {
        self.state().rejected_writes = message.map(str::to_string);
    }

    /// Acknowledges schema patches without applying them.
    pub fn lose_patches(&self, lose: bool) {
        self.state().lose_patches = lose;
    }

    /// Delays every schema patch, widening read-then-patch race windows.
    pub fn set_patch_delay(&self, delay: Option<Duration>) {
        self.state().patch_delay = delay;
    }

    /// Stores `field` as empty whenever a record is written.
    pub fn blank_on_write(&self, field: impl Into<String>) {
        self.state().blank_on_write.insert(field.into());
    }

    /// Makes record re-reads fail.
    pub fn fail_record_reads(&self, failing: bool) {
        self.state().failing_reads = failing;
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn record(&self, record_id: &str) -> Option<Record> {
        self.state().records.get(record_id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state().records.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl MemoryState {
    fn check_available(&self, collection_id: &str) -> RemoteResult<()> {
        if self.unavailable.contains(collection_id) {
            return Err(RemoteError::Transport(format!(
                "collection '{}' is unreachable",
                collection_id
            )));
        }
        Ok(())
    }

    fn check_writable(&self) -> RemoteResult<()> {
        match &self.rejected_writes {
            Some(message) => Err(RemoteError::Rejected {
                status: 400,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn stored_fields(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .map(|(name, value)| {
                let stored = if self.blank_on_write.contains(name) {
                    value.cleared()
                } else {
                    value.clone()
                };
                (name.clone(), stored)
            })
            .collect()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get_schema(&self, collection_id: &str) -> RemoteResult<SchemaSnapshot> {
        let mut state = self.state();
        state.calls.get_schema += 1;
        state.check_available(collection_id)?;
        state
            .schemas
            .get(collection_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(collection_id.to_string()))
    }

    async fn patch_schema(
        &self,
        collection_id: &str,
        field: &str,
        options: &[String],
    ) -> RemoteResult<()> {
        let delay = {
            let mut state = self.state();
            state.calls.patch_schema += 1;
            state.check_available(collection_id)?;
            state.patch_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.lose_patches {
            return Ok(());
        }

        let snapshot = state
            .schemas
            .get_mut(collection_id)
            .ok_or_else(|| RemoteError::NotFound(collection_id.to_string()))?;

        match snapshot.properties.get(field) {
            Some(field_type) if field_type.is_enum() => {
                snapshot
                    .enum_options
                    .insert(field.to_string(), options.to_vec());
                Ok(())
            }
            Some(field_type) => Err(RemoteError::Rejected {
                status: 400,
                message: format!("field '{}' is of type {} and has no options", field, field_type),
            }),
            None => Err(RemoteError::Rejected {
                status: 400,
                message: format!("field '{}' does not exist", field),
            }),
        }
    }

    async fn query(
        &self,
        collection_id: &str,
        filter: Option<&RecordFilter>,
    ) -> RemoteResult<Vec<Record>> {
        let mut state = self.state();
        state.calls.query += 1;
        state.check_available(collection_id)?;
        if !state.schemas.contains_key(collection_id) {
            return Err(RemoteError::NotFound(collection_id.to_string()));
        }

        Ok(state
            .records
            .values()
            .filter(|r| r.collection_id == collection_id)
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .cloned()
            .collect())
    }

    async fn create_record(&self, collection_id: &str, fields: &FieldMap) -> RemoteResult<Record> {
        let mut state = self.state();
        state.calls.create_record += 1;
        state.check_available(collection_id)?;
        if !state.schemas.contains_key(collection_id) {
            return Err(RemoteError::NotFound(collection_id.to_string()));
        }
        state.check_writable()?;

        state.next_record += 1;
        let record = Record {
            id: format!("rec-{}", state.next_record),
            collection_id: collection_id.to_string(),
            fields: state.stored_fields(fields),
        };
        state.records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_record(&self, record_id: &str, fields: &FieldMap) -> RemoteResult<Record> {
        let mut state = self.state();
        state.calls.update_record += 1;

        let collection_id = state
            .records
            .get(record_id)
            .map(|r| r.collection_id.clone())
            .ok_or_else(|| RemoteError::NotFound(record_id.to_string()))?;
        state.check_available(&collection_id)?;
        state.check_writable()?;

        let stored = state.stored_fields(fields);
        let record = state
            .records
            .get_mut(record_id)
            .ok_or_else(|| RemoteError::NotFound(record_id.to_string()))?;
        record.fields.extend(stored);
        Ok(record.clone())
    }

    async fn get_record(&self, record_id: &str) -> RemoteResult<Record> {
        let mut state = self.state();
        state.calls.get_record += 1;
        if state.failing_reads {
            return Err(RemoteError::Transport("record read failed".into()));
        }
        state
            .records
            .get(record_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(record_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, FieldValue};

    fn remote() -> MemoryRemote {
        MemoryRemote::new().with_schema(
            "db-tasks",
            SchemaSnapshot::new()
                .with_field("Задача", FieldType::Title)
                .with_field("Статус", FieldType::SingleEnum)
                .with_options("Статус", &["To do", "Done"]),
        )
    }

    fn fields() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("Задача".into(), FieldValue::title("Макет"));
        fields.insert("Статус".into(), FieldValue::select("Done"));
        fields
    }

    #[tokio::test]
    async fn test_schema_read_and_patch() {
        let remote = remote();
        let options = vec!["To do".to_string(), "Done".into(), "Blocked".into()];
        remote.patch_schema("db-tasks", "Статус", &options).await.unwrap();

        let snapshot = remote.get_schema("db-tasks").await.unwrap();
        assert!(snapshot.has_option("Статус", "Blocked"));
        assert_eq!(remote.calls().patch_schema, 1);
        assert_eq!(remote.calls().get_schema, 1);
    }

    #[tokio::test]
    async fn test_patch_non_enum_rejected() {
        let remote = remote();
        let result = remote.patch_schema("db-tasks", "Задача", &["x".into()]).await;
        assert!(matches!(result, Err(RemoteError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_lost_patch_is_acknowledged() {
        let remote = remote();
        remote.lose_patches(true);
        remote
            .patch_schema("db-tasks", "Статус", &["Blocked".into()])
            .await
            .unwrap();
        assert!(!remote.schema("db-tasks").unwrap().has_option("Статус", "Blocked"));
    }

    #[tokio::test]
    async fn test_record_crud() {
        let remote = remote();
        let record = remote.create_record("db-tasks", &fields()).await.unwrap();
        assert_eq!(record.id, "rec-1");

        let mut patch = FieldMap::new();
        patch.insert("Статус".into(), FieldValue::select("To do"));
        let updated = remote.update_record(&record.id, &patch).await.unwrap();
        assert_eq!(updated.fields["Статус"], FieldValue::select("To do"));
        assert_eq!(updated.fields["Задача"], FieldValue::title("Макет"));

        let read = remote.get_record(&record.id).await.unwrap();
        assert_eq!(read, updated);
        assert_eq!(remote.calls().mutations(), 2);
    }

    #[tokio::test]
    async fn test_unknown_collection_not_found() {
        let remote = remote();
        assert!(matches!(
            remote.get_schema("db-none").await,
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            remote.create_record("db-none", &fields()).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let remote = remote();
        remote.set_unavailable("db-tasks", true);
        assert!(matches!(
            remote.get_schema("db-tasks").await,
            Err(RemoteError::Transport(_))
        ));
        remote.set_unavailable("db-tasks", false);

        remote.reject_writes(Some("validation_error"));
        assert!(matches!(
            remote.create_record("db-tasks", &fields()).await,
            Err(RemoteError::Rejected { .. })
        ));
        remote.reject_writes(None);

        remote.blank_on_write("Статус");
        let record = remote.create_record("db-tasks", &fields()).await.unwrap();
        assert_eq!(record.fields["Статус"], FieldValue::SingleEnum(None));
    }

    #[tokio::test]
    async fn test_query_with_filter() {
        let remote = remote();
        remote.create_record("db-tasks", &fields()).await.unwrap();
        let mut other = fields();
        other.insert("Статус".into(), FieldValue::select("To do"));
        remote.create_record("db-tasks", &other).await.unwrap();

        let all = remote.query("db-tasks", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let filter = RecordFilter::equals("Статус", FieldValue::select("Done"));
        let done = remote.query("db-tasks", Some(&filter)).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "rec-1");
    }
}
