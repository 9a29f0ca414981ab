//! Validating writer
//!
//! Every write is checked against the schema store before anything is sent:
//!
//! 1. Structure: each field is declared and its value matches the declared
//!    type. Checked locally with no remote calls; any failure rejects.
//! 2. Options: each enum value is a declared option or a live option known to
//!    the schema cache. Under `auto_extend` missing options are added and the
//!    field is re-checked once.
//!
//! Only then is the record created or updated, and the result re-read by the
//! [`PostWriteVerifier`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::SchemaCache;
use crate::errors::{EngineError, EngineResult, ValidationDetails};
use crate::observability::{Event, Logger};
use crate::remote::{with_timeout, RemoteError, RemoteStore};
use crate::schema::{CollectionSchema, FieldMap, SchemaStore};

use super::options::OptionExtender;
use super::result::{describe, WriteResult};
use super::verifier::PostWriteVerifier;

/// Handling of enum values that are not known options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Reject the write
    #[default]
    Strict,
    /// Add the option remotely, then re-validate once
    AutoExtend,
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Create,
    Update(&'a str),
}

/// Schema-checked writes to the remote store
pub struct ValidatingWriter {
    store: Arc<SchemaStore>,
    cache: Arc<SchemaCache>,
    remote: Arc<dyn RemoteStore>,
    extender: Arc<OptionExtender>,
    verifier: PostWriteVerifier,
    policy: WritePolicy,
    timeout: Duration,
}

impl ValidatingWriter {
    pub fn new(
        store: Arc<SchemaStore>,
        cache: Arc<SchemaCache>,
        remote: Arc<dyn RemoteStore>,
        extender: Arc<OptionExtender>,
        policy: WritePolicy,
        timeout: Duration,
    ) -> Self {
        let verifier = PostWriteVerifier::new(remote.clone(), timeout);
        Self {
            store,
            cache,
            remote,
            extender,
            verifier,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Creates a record in `collection`.
    pub async fn write(&self, collection: &str, fields: &FieldMap) -> WriteResult {
        self.execute(collection, Target::Create, fields).await
    }

    /// Updates the given fields of an existing record.
    pub async fn update(&self, collection: &str, record_id: &str, fields: &FieldMap) -> WriteResult {
        self.execute(collection, Target::Update(record_id), fields).await
    }

    async fn execute(&self, collection: &str, target: Target<'_>, fields: &FieldMap) -> WriteResult {
        let schema = match self.store.get(collection) {
            Ok(schema) => schema,
            Err(e) => return self.reject(collection, vec![e]),
        };

        let structural = structural_errors(schema, fields);
        if !structural.is_empty() {
            let errors = structural.into_iter().map(EngineError::Validation).collect();
            return self.reject(collection, errors);
        }

        match self.check_options(schema, fields).await {
            Ok(errors) if !errors.is_empty() => return self.reject(collection, errors),
            Ok(_) => {}
            Err(e) => return self.fail(collection, &e),
        }

        let written = match target {
            Target::Create => {
                with_timeout(
                    self.timeout,
                    self.remote.create_record(&schema.remote_id, fields),
                )
                .await
            }
            Target::Update(record_id) => {
                with_timeout(self.timeout, self.remote.update_record(record_id, fields)).await
            }
        };

        let record = match written {
            Ok(record) => record,
            Err(RemoteError::NotFound(id)) if matches!(target, Target::Update(_)) => {
                let err = EngineError::WriteRejected(format!("record '{}' not found", id));
                return self.fail(collection, &err);
            }
            Err(e) => return self.fail(collection, &EngineError::from(e)),
        };

        Logger::info(
            Event::WriteCommitted,
            &[("collection", collection), ("record_id", &record.id)],
        );

        let (_, warnings) = self.verifier.verify(&record.id, fields).await;
        WriteResult::committed(record.id, warnings)
    }

    /// Option membership errors, after auto-extension if enabled.
    ///
    /// Returns `Err` only when the live schema or the extension call fails.
    async fn check_options(
        &self,
        schema: &CollectionSchema,
        fields: &FieldMap,
    ) -> EngineResult<Vec<EngineError>> {
        let mut errors = Vec::new();

        for (field, value) in fields {
            // Unknown types pass through; only enum fields carry options.
            if !schema.field(field).map_or(false, |s| s.field_type.is_enum()) {
                continue;
            }
            let declared = schema.options(field);
            let undeclared: Vec<&str> = value
                .enum_values()
                .into_iter()
                .filter(|v| !declared.iter().any(|d| d == v))
                .collect();
            if undeclared.is_empty() {
                continue;
            }

            let live = self.cache.get_schema(&schema.remote_id, false).await?;
            let missing: Vec<String> = undeclared
                .into_iter()
                .filter(|v| !live.has_option(field, v))
                .map(str::to_string)
                .collect();
            if missing.is_empty() {
                continue;
            }

            if self.policy == WritePolicy::AutoExtend {
                self.extender
                    .ensure_options_exist(&schema.name, field, &missing)
                    .await?;

                // Exactly one re-check; a lost extension is a hard failure.
                let live = self.cache.get_schema(&schema.remote_id, false).await?;
                for value in missing.iter().filter(|v| !live.has_option(field, v)) {
                    errors.push(EngineError::Validation(ValidationDetails::option_not_allowed(
                        field.as_str(),
                        value.as_str(),
                    )));
                }
            } else {
                for value in &missing {
                    errors.push(EngineError::Validation(ValidationDetails::option_not_allowed(
                        field.as_str(),
                        value.as_str(),
                    )));
                }
            }
        }

        Ok(errors)
    }

    fn reject(&self, collection: &str, errors: Vec<EngineError>) -> WriteResult {
        let result = WriteResult::rejected(&errors);
        Logger::warn(
            Event::WriteRejected,
            &[
                ("collection", collection),
                ("errors", &result.validation_errors.join("; ")),
            ],
        );
        result
    }

    fn fail(&self, collection: &str, error: &EngineError) -> WriteResult {
        Logger::error(
            Event::WriteFailed,
            &[
                ("collection", collection),
                ("code", error.code()),
                ("error", &describe(error)),
            ],
        );
        WriteResult::failed(error, Vec::new())
    }
}

fn structural_errors(schema: &CollectionSchema, fields: &FieldMap) -> Vec<ValidationDetails> {
    fields
        .iter()
        .filter_map(|(name, value)| match schema.field(name) {
            None => Some(ValidationDetails::unknown_field(name.as_str())),
            Some(spec) if !value.is_compatible_with(&spec.field_type) => Some(
                ValidationDetails::wrong_type(
                    name.as_str(),
                    spec.field_type.type_name(),
                    value.kind_name(),
                ),
            ),
            Some(_) => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::remote::{MemoryRemote, SchemaSnapshot};
    use crate::schema::{FieldType, FieldValue};
    use crate::writer::WriteState;
    use tempfile::TempDir;

    fn declared() -> CollectionSchema {
        CollectionSchema::new("tasks", "db-tasks")
            .with_field("Задача", FieldType::Title)
            .with_field("Статус", FieldType::SingleEnum)
            .with_field("Категория", FieldType::MultiEnum)
            .with_field("Исполнитель", FieldType::Unknown("people".into()))
            .with_options("Статус", &["To do", "Done"])
    }

    fn writer(dir: &TempDir, remote: &Arc<MemoryRemote>, policy: WritePolicy) -> ValidatingWriter {
        let store = Arc::new(SchemaStore::from_collections(vec![declared()]).unwrap());
        let cache = Arc::new(SchemaCache::new(
            remote.clone(),
            Arc::new(SystemClock),
            dir.path(),
            Duration::from_secs(3600),
            Duration::from_secs(5),
        ));
        let extender = Arc::new(OptionExtender::new(
            store.clone(),
            cache.clone(),
            remote.clone(),
            Duration::from_secs(5),
        ));
        ValidatingWriter::new(store, cache, remote.clone(), extender, policy, Duration::from_secs(5))
    }

    fn remote() -> Arc<MemoryRemote> {
        Arc::new(
            MemoryRemote::new().with_schema(
                "db-tasks",
                SchemaSnapshot::new()
                    .with_field("Задача", FieldType::Title)
                    .with_field("Статус", FieldType::SingleEnum)
                    .with_field("Категория", FieldType::MultiEnum)
                    .with_field("Исполнитель", FieldType::Unknown("people".into()))
                    .with_options("Статус", &["To do", "Done", "Blocked"])
                    .with_options("Категория", &["SMM"]),
            ),
        )
    }

    fn fields(pairs: Vec<(&str, FieldValue)>) -> FieldMap {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[tokio::test]
    async fn test_declared_option_needs_no_schema_read() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let result = writer
            .write(
                "tasks",
                &fields(vec![("Задача", FieldValue::title("Макет")), ("Статус", FieldValue::select("Done"))]),
            )
            .await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.state, WriteState::Done);
        assert_eq!(remote.calls().get_schema, 0);
        assert_eq!(remote.calls().create_record, 1);
    }

    #[tokio::test]
    async fn test_live_option_accepted() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let result = writer
            .write("tasks", &fields(vec![("Статус", FieldValue::select("Blocked"))]))
            .await;
        assert!(result.success);
        assert_eq!(remote.calls().get_schema, 1);
    }

    #[tokio::test]
    async fn test_unknown_field_and_wrong_type_rejected_locally() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::AutoExtend);

        let result = writer
            .write(
                "tasks",
                &fields(vec![
                    ("Оценка", FieldValue::Number(Some(5.0))),
                    ("Статус", FieldValue::multi_select(&["Done"])),
                ]),
            )
            .await;

        assert_eq!(result.state, WriteState::Rejected);
        assert_eq!(result.validation_errors.len(), 2);
        assert!(result.validation_errors.iter().any(|e| e.contains("field does not exist")));
        assert!(result.validation_errors.iter().any(|e| e.contains("wrong type")));
        assert_eq!(remote.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_unknown_type_passes_through() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let result = writer
            .write(
                "tasks",
                &fields(vec![("Исполнитель", FieldValue::Raw(serde_json::json!([{"id": "u1"}])))]),
            )
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_unknown_type_skips_option_check() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::AutoExtend);

        let result = writer
            .write("tasks", &fields(vec![("Исполнитель", FieldValue::multi_select(&["u1"]))]))
            .await;

        assert!(result.success, "{:?}", result);
        assert_eq!(remote.calls().get_schema, 0);
        assert_eq!(remote.calls().patch_schema, 0);
    }

    #[tokio::test]
    async fn test_strict_rejects_unknown_option() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let result = writer
            .write("tasks", &fields(vec![("Категория", FieldValue::multi_select(&["SMM", "Фото"]))]))
            .await;

        assert_eq!(result.state, WriteState::Rejected);
        assert!(result.validation_errors[0].contains("'Фото'"));
        assert_eq!(remote.calls().mutations(), 0);
    }

    #[tokio::test]
    async fn test_auto_extend_adds_option() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::AutoExtend);

        let result = writer
            .write("tasks", &fields(vec![("Категория", FieldValue::multi_select(&["Фото"]))]))
            .await;

        assert!(result.success, "{:?}", result);
        assert_eq!(remote.calls().patch_schema, 1);
        assert!(remote.schema("db-tasks").unwrap().has_option("Категория", "Фото"));
    }

    #[tokio::test]
    async fn test_unknown_collection_rejected() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let result = writer.write("habits", &FieldMap::new()).await;
        assert_eq!(result.state, WriteState::Rejected);
        assert!(result.validation_errors[0].starts_with("SG_SCHEMA_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_remote_rejection_fails_without_retry() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        remote.reject_writes(Some("body failed validation"));
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let result = writer
            .write("tasks", &fields(vec![("Задача", FieldValue::title("Макет"))]))
            .await;

        assert_eq!(result.state, WriteState::Failed);
        assert!(result.validation_errors[0].starts_with("SG_WRITE_REJECTED"));
        assert_eq!(remote.calls().create_record, 1);
    }

    #[tokio::test]
    async fn test_update_existing_and_missing_record() {
        let dir = TempDir::new().unwrap();
        let remote = remote();
        let writer = writer(&dir, &remote, WritePolicy::Strict);

        let created = writer
            .write("tasks", &fields(vec![("Задача", FieldValue::title("Макет"))]))
            .await;
        let record_id = created.record_id.unwrap();

        let updated = writer
            .update("tasks", &record_id, &fields(vec![("Статус", FieldValue::select("Done"))]))
            .await;
        assert!(updated.success);
        assert_eq!(
            remote.record(&record_id).unwrap().fields["Статус"],
            FieldValue::select("Done")
        );

        let missing = writer
            .update("tasks", "rec-404", &fields(vec![("Статус", FieldValue::select("Done"))]))
            .await;
        assert_eq!(missing.state, WriteState::Failed);
        assert!(missing.validation_errors[0].contains("record 'rec-404' not found"));
    }

    #[test]
    fn test_policy_serde() {
        let policy: WritePolicy = serde_json::from_str("\"auto_extend\"").unwrap();
        assert_eq!(policy, WritePolicy::AutoExtend);
    }
}
