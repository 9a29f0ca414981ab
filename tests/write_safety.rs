//! Safe-write guarantees
//!
//! - Validation failures send nothing to the remote store
//! - Option extension is idempotent
//! - Auto-extension re-validates exactly once
//! - Verification findings never fail a committed write

use std::sync::Arc;

use schemaguard::clock::SystemClock;
use schemaguard::config::Config;
use schemaguard::engine::Engine;
use schemaguard::notify::MemorySink;
use schemaguard::remote::{MemoryRemote, SchemaSnapshot};
use schemaguard::schema::{CollectionSchema, FieldMap, FieldType, FieldValue, SchemaStore};
use schemaguard::writer::{OptionOutcome, WritePolicy, WriteState};
use tempfile::TempDir;

fn declared() -> SchemaStore {
    SchemaStore::from_collections(vec![CollectionSchema::new("tasks", "db-tasks")
        .with_field("Name", FieldType::Title)
        .with_field("Status", FieldType::SingleEnum)
        .with_field("Tags", FieldType::MultiEnum)
        .with_field("Due", FieldType::Date)
        .with_options("Status", &["Todo", "Done"])
        .with_options("Tags", &["home", "work"])])
    .unwrap()
}

fn live() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_field("Name", FieldType::Title)
        .with_field("Status", FieldType::SingleEnum)
        .with_field("Tags", FieldType::MultiEnum)
        .with_field("Due", FieldType::Date)
        .with_options("Status", &["Todo", "Done"])
        .with_options("Tags", &["home", "work"])
}

fn engine(dir: &TempDir, policy: WritePolicy) -> (Engine, Arc<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::new().with_schema("db-tasks", live()));
    let mut config = Config::new("schema.json", dir.path().to_string_lossy());
    config.write_policy = policy;
    let engine = Engine::new(
        config,
        declared(),
        remote.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(SystemClock),
    );
    (engine, remote)
}

fn task(name: &str, status: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("Name".into(), FieldValue::title(name));
    fields.insert("Status".into(), FieldValue::select(status));
    fields
}

#[tokio::test]
async fn test_unknown_field_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let mut fields = task("Water plants", "Todo");
    fields.insert("Mood".into(), FieldValue::text("calm"));
    let result = engine.writer().write("tasks", &fields).await;

    assert!(!result.success);
    assert_eq!(result.state, WriteState::Rejected);
    assert!(result.validation_errors[0].contains("Mood"));
    assert_eq!(remote.calls().total(), 0);
    assert_eq!(remote.record_count(), 0);
}

#[tokio::test]
async fn test_wrong_type_sends_nothing() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let mut fields = task("Water plants", "Todo");
    fields.insert("Due".into(), FieldValue::Checkbox(true));
    let result = engine.writer().write("tasks", &fields).await;

    assert_eq!(result.state, WriteState::Rejected);
    assert_eq!(remote.calls().total(), 0);
}

#[tokio::test]
async fn test_unknown_collection_rejected() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let result = engine.writer().write("habits", &task("Run", "Todo")).await;
    assert_eq!(result.state, WriteState::Rejected);
    assert!(result.validation_errors[0].starts_with("SG_SCHEMA_NOT_FOUND"));
    assert_eq!(remote.calls().total(), 0);
}

#[tokio::test]
async fn test_declared_options_need_no_schema_read() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let result = engine.writer().write("tasks", &task("Water plants", "Done")).await;

    assert!(result.success);
    assert_eq!(result.state, WriteState::Done);
    assert_eq!(remote.calls().get_schema, 0);
    assert_eq!(remote.calls().create_record, 1);
}

#[tokio::test]
async fn test_strict_rejects_undeclared_option() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let result = engine.writer().write("tasks", &task("Water plants", "Blocked")).await;

    assert_eq!(result.state, WriteState::Rejected);
    assert!(result.validation_errors[0].contains("Blocked"));
    assert_eq!(remote.calls().mutations(), 0);
}

#[tokio::test]
async fn test_live_option_accepted_under_strict() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);
    remote.set_schema("db-tasks", live().with_options("Status", &["Todo", "Done", "Blocked"]));

    let result = engine.writer().write("tasks", &task("Water plants", "Blocked")).await;

    assert!(result.success, "{:?}", result);
    assert_eq!(remote.calls().patch_schema, 0);
}

#[tokio::test]
async fn test_ensure_option_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let first = engine
        .extender()
        .ensure_option_exists("tasks", "Tags", "errands")
        .await
        .unwrap();
    let second = engine
        .extender()
        .ensure_option_exists("tasks", "Tags", "errands")
        .await
        .unwrap();

    assert_eq!(first, OptionOutcome::Added);
    assert_eq!(second, OptionOutcome::AlreadyExists);
    assert_eq!(remote.calls().patch_schema, 1);

    let options = remote.schema("db-tasks").unwrap().options("Tags").to_vec();
    assert_eq!(options, vec!["home", "work", "errands"]);
}

#[tokio::test]
async fn test_auto_extend_adds_then_writes() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::AutoExtend);

    let mut fields = task("Water plants", "Todo");
    fields.insert("Tags".into(), FieldValue::multi_select(&["home", "garden"]));
    let result = engine.writer().write("tasks", &fields).await;

    assert!(result.success, "{:?}", result);
    assert_eq!(remote.calls().patch_schema, 1);
    assert!(remote.schema("db-tasks").unwrap().has_option("Tags", "garden"));
}

#[tokio::test]
async fn test_auto_extend_retries_once() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::AutoExtend);
    remote.lose_patches(true);

    let result = engine.writer().write("tasks", &task("Water plants", "Blocked")).await;

    assert_eq!(result.state, WriteState::Rejected);
    assert!(result.validation_errors[0].contains("Blocked"));
    assert_eq!(remote.calls().patch_schema, 1);
    assert_eq!(remote.calls().create_record, 0);
}

#[tokio::test]
async fn test_verification_mismatch_is_warning() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);
    remote.blank_on_write("Status");

    let result = engine.writer().write("tasks", &task("Water plants", "Done")).await;

    assert!(result.success);
    assert_eq!(result.state, WriteState::DoneWithWarnings);
    assert!(result.record_id.is_some());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].starts_with("SG_VERIFICATION_MISMATCH"));
}

#[tokio::test]
async fn test_remote_rejection_is_failed_write() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);
    remote.reject_writes(Some("title too long"));

    let result = engine.writer().write("tasks", &task("Water plants", "Done")).await;

    assert!(!result.success);
    assert_eq!(result.state, WriteState::Failed);
    assert!(result.validation_errors[0].starts_with("SG_WRITE_REJECTED"));
}

#[tokio::test]
async fn test_update_existing_record() {
    let dir = TempDir::new().unwrap();
    let (engine, remote) = engine(&dir, WritePolicy::Strict);

    let created = engine.writer().write("tasks", &task("Water plants", "Todo")).await;
    let id = created.record_id.unwrap();

    let mut change = FieldMap::new();
    change.insert("Status".into(), FieldValue::select("Done"));
    let updated = engine.writer().update("tasks", &id, &change).await;

    assert!(updated.success, "{:?}", updated);
    let record = remote.record(&id).unwrap();
    assert_eq!(record.fields["Status"], FieldValue::select("Done"));
    assert_eq!(record.fields["Name"], FieldValue::title("Water plants"));
}

#[tokio::test]
async fn test_status_option_added_exactly_once() {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(
        MemoryRemote::new().with_schema(
            "db-projects",
            SchemaSnapshot::new()
                .with_field("Проект", FieldType::Title)
                .with_field("Статус", FieldType::SingleEnum)
                .with_options("Статус", &["To do", "Done"]),
        ),
    );
    let store = SchemaStore::from_collections(vec![CollectionSchema::new("projects", "db-projects")
        .with_field("Проект", FieldType::Title)
        .with_field("Статус", FieldType::SingleEnum)
        .with_options("Статус", &["To do", "Done"])])
    .unwrap();
    let engine = Engine::new(
        Config::new("schema.json", dir.path().to_string_lossy()),
        store,
        remote.clone(),
        Arc::new(MemorySink::new()),
        Arc::new(SystemClock),
    );

    for _ in 0..2 {
        engine
            .extender()
            .ensure_option_exists("projects", "Статус", "In Review")
            .await
            .unwrap();
    }

    let options = remote.schema("db-projects").unwrap().options("Статус").to_vec();
    assert_eq!(options.iter().filter(|o| *o == "In Review").count(), 1);
    assert_eq!(remote.calls().patch_schema, 1);
}

#[tokio::test]
async fn test_unknown_type_field_passes_through_under_both_policies() {
    for policy in [WritePolicy::Strict, WritePolicy::AutoExtend] {
        let dir = TempDir::new().unwrap();
        let remote = Arc::new(
            MemoryRemote::new().with_schema(
                "db-tasks",
                live().with_field("People", FieldType::Unknown("people".into())),
            ),
        );
        let store = SchemaStore::from_collections(vec![CollectionSchema::new("tasks", "db-tasks")
            .with_field("Name", FieldType::Title)
            .with_field("People", FieldType::Unknown("people".into()))])
        .unwrap();
        let mut config = Config::new("schema.json", dir.path().to_string_lossy());
        config.write_policy = policy;
        let engine = Engine::new(
            config,
            store,
            remote.clone(),
            Arc::new(MemorySink::new()),
            Arc::new(SystemClock),
        );

        let mut fields = FieldMap::new();
        fields.insert("Name".into(), FieldValue::title("Review draft"));
        fields.insert("People".into(), FieldValue::multi_select(&["u1"]));
        let result = engine.writer().write("tasks", &fields).await;

        assert!(result.success, "{:?}: {:?}", policy, result);
        assert_eq!(result.state, WriteState::Done);
        assert_eq!(remote.calls().patch_schema, 0);
        assert_eq!(remote.calls().create_record, 1);
    }
}
