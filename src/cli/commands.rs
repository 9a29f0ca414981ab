//! CLI command implementations
//!
//! `stub`, `reset-guard` and `show` without `--live` work on local state only
//! and need no remote credential. Every other command connects an [`Engine`].
//!
//! Each command produces a JSON value; [`run_command`] prints it as a
//! `{"status": "ok", "data": ...}` response, or an error response on failure.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::Config;
use crate::drift::{generate_migration_stub, write_migration_stub, ChangeLog, RunStateStore};
use crate::engine::Engine;
use crate::observability::{init_logging, log_event, Event, Logger};
use crate::remote::RecordFilter;
use crate::schema::{FieldMap, SchemaStore};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{parse_fields, read_request, write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let config_path = cmd.config_path().clone();
    let config = Config::load(&config_path)?;
    init_logging(&config.log_level, config.log_format).map_err(CliError::config_error)?;
    log_event(
        Event::ConfigLoaded,
        &[("path", &config_path.display().to_string())],
    );

    let fields = match &cmd {
        Command::Write { .. } => Some(parse_fields(read_request()?)?),
        _ => None,
    };

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))?;

    match rt.block_on(execute(config, cmd, fields)) {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

async fn execute(config: Config, cmd: Command, fields: Option<FieldMap>) -> CliResult<Value> {
    match cmd {
        Command::Scan { force, .. } => scan(&Engine::from_config(config)?, force).await,
        Command::Watch { .. } => watch(&Engine::from_config(config)?).await,
        Command::Write {
            collection, record, ..
        } => {
            let fields = fields.ok_or_else(|| CliError::input_error("no field values given"))?;
            write(
                &Engine::from_config(config)?,
                &collection,
                record.as_deref(),
                &fields,
            )
            .await
        }
        Command::EnsureOption {
            collection,
            field,
            values,
            ..
        } => ensure_option(&Engine::from_config(config)?, &collection, &field, &values).await,
        Command::Stub { run, .. } => stub(&config, run.as_deref()),
        Command::Show {
            collection, live, ..
        } => {
            if live {
                show_live(&Engine::from_config(config)?, &collection).await
            } else {
                let store = SchemaStore::load(Path::new(&config.schema_path))?;
                show_declared(&store, &collection)
            }
        }
        Command::Query {
            collection, filter, ..
        } => {
            let filter = filter.as_deref().map(parse_filter).transpose()?;
            query(&Engine::from_config(config)?, &collection, filter.as_ref()).await
        }
        Command::ResetGuard { .. } => reset_guard(&config),
    }
}

/// One guarded scan.
///
/// A skipped scan is a successful response; an aborted one is an error.
pub async fn scan(engine: &Engine, force: bool) -> CliResult<Value> {
    let report = engine
        .detector()
        .run_scan(force, &AtomicBool::new(false))
        .await;
    if let Some(failure) = &report.failure {
        return Err(CliError::scan_failed(failure.clone()));
    }
    Ok(serde_json::to_value(&report)?)
}

/// Scans on the cron schedule until Ctrl-C.
///
/// An interrupt during a scan stops it between collections.
pub async fn watch(engine: &Engine) -> CliResult<Value> {
    let schedule = engine.config().watch_schedule()?;
    let cancel = Arc::new(AtomicBool::new(false));
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.store(true, Ordering::SeqCst);
                let _ = stop_tx.send(true);
            }
        });
    }

    Logger::info(
        Event::WatchStart,
        &[("schedule", &engine.config().watch_cron)],
    );

    let mut scans: u64 = 0;
    while !cancel.load(Ordering::SeqCst) {
        let now = Utc::now();
        let next = schedule.find_next_occurrence(&now, false).map_err(|e| {
            CliError::config_error(format!("no next run for '{}': {}", engine.config().watch_cron, e))
        })?;
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        Logger::info(Event::WatchTick, &[("next_run", &next.to_rfc3339())]);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            Ok(()) = stop_rx.changed() => break,
        }

        engine.detector().run_scan(false, &cancel).await;
        scans += 1;
    }

    Logger::info(Event::ShutdownStart, &[("scans", &scans.to_string())]);
    Ok(json!({ "scans": scans }))
}

/// Validated create, or update when `record_id` is given.
pub async fn write(
    engine: &Engine,
    collection: &str,
    record_id: Option<&str>,
    fields: &FieldMap,
) -> CliResult<Value> {
    let result = match record_id {
        Some(id) => engine.writer().update(collection, id, fields).await,
        None => engine.writer().write(collection, fields).await,
    };
    Ok(serde_json::to_value(&result)?)
}

pub async fn ensure_option(
    engine: &Engine,
    collection: &str,
    field: &str,
    values: &[String],
) -> CliResult<Value> {
    let outcomes = engine
        .extender()
        .ensure_options_exist(collection, field, values)
        .await?;
    let outcomes: Vec<Value> = outcomes
        .into_iter()
        .map(|(value, outcome)| json!({ "value": value, "outcome": outcome }))
        .collect();
    Ok(json!({ "collection": collection, "field": field, "options": outcomes }))
}

/// Rewrites the migration draft from the change log.
///
/// Without `run`, the run of the most recent logged change is used.
pub fn stub(config: &Config, run: Option<&str>) -> CliResult<Value> {
    let paths = config.paths();
    let changes = ChangeLog::new(&paths.changes).read_all()?;

    let run_id = match run {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|e| CliError::input_error(format!("invalid run id '{}': {}", raw, e)))?,
        ),
        None => changes.last().map(|c| c.run_id),
    };
    let selected: Vec<_> = changes
        .into_iter()
        .filter(|c| Some(c.run_id) == run_id)
        .collect();

    let stub = generate_migration_stub(&selected, Utc::now());
    write_migration_stub(&paths.migration_stub, &stub)?;
    Ok(json!({
        "path": paths.migration_stub.display().to_string(),
        "run_id": run_id,
        "changes": selected.len(),
        "stub": stub,
    }))
}

pub fn show_declared(store: &SchemaStore, collection: &str) -> CliResult<Value> {
    let schema = store.get(collection)?;
    Ok(json!({ "declared": schema }))
}

/// Declared schema next to the live one from the cache.
pub async fn show_live(engine: &Engine, collection: &str) -> CliResult<Value> {
    let schema = engine.store().get(collection)?;
    let live = engine.cache().get_schema(&schema.remote_id, false).await?;
    Ok(json!({ "declared": schema, "live": live }))
}

pub async fn query(
    engine: &Engine,
    collection: &str,
    filter: Option<&RecordFilter>,
) -> CliResult<Value> {
    let records = engine.query(collection, filter).await?;
    Ok(json!({ "count": records.len(), "records": records }))
}

fn parse_filter(raw: &str) -> CliResult<RecordFilter> {
    serde_json::from_str(raw).map_err(|e| CliError::input_error(format!("invalid filter: {}", e)))
}

pub fn reset_guard(config: &Config) -> CliResult<Value> {
    let store = RunStateStore::new(config.paths().run_state);
    store.reset()?;
    Ok(json!({ "reset": true }))
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::clock::SystemClock;
    use crate::drift::{Change, ChangeType};
    use crate::notify::MemorySink;
    use crate::remote::{MemoryRemote, SchemaSnapshot};
    use crate::schema::{CollectionSchema, FieldType, FieldValue};
    use tempfile::TempDir;

    fn store() -> SchemaStore {
        SchemaStore::from_collections(vec![CollectionSchema::new("tasks", "db-tasks")
            .with_field("Name", FieldType::Title)
            .with_field("Tags", FieldType::MultiEnum)
            .with_options("Tags", &["home"])])
        .unwrap()
    }

    fn engine(dir: &TempDir, live: SchemaSnapshot) -> (Engine, Arc<MemoryRemote>) {
        let remote = Arc::new(MemoryRemote::new().with_schema("db-tasks", live));
        let config = Config::new("unused.json", dir.path().to_string_lossy());
        let engine = Engine::new(
            config,
            store(),
            remote.clone(),
            Arc::new(MemorySink::new()),
            Arc::new(SystemClock),
        );
        (engine, remote)
    }

    fn live() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .with_field("Name", FieldType::Title)
            .with_field("Tags", FieldType::MultiEnum)
            .with_options("Tags", &["home"])
    }

    #[tokio::test]
    async fn test_scan_reports_new_option() {
        let dir = TempDir::new().unwrap();
        let (engine, _remote) = engine(&dir, live().with_options("Tags", &["home", "errands"]));

        let data = scan(&engine, false).await.unwrap();
        assert_eq!(data["changes"].as_array().unwrap().len(), 1);
        assert_eq!(data["changes"][0]["change_type"], "new_enum_value");
        assert_eq!(data["changes"][0]["new_value"], "errands");

        // Second scan the same day is skipped by the run guard.
        let again = scan(&engine, false).await.unwrap();
        assert!(again["skipped"].is_string());
    }

    #[tokio::test]
    async fn test_write_rejected_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir, live());

        let mut fields = FieldMap::new();
        fields.insert("Name".into(), FieldValue::title("Buy milk"));
        fields.insert("Priority".into(), FieldValue::text("high"));
        let data = write(&engine, "tasks", None, &fields).await.unwrap();

        assert_eq!(data["success"], false);
        assert_eq!(data["state"], "rejected");
        assert_eq!(remote.calls().mutations(), 0);
    }

    #[tokio::test]
    async fn test_ensure_option_outcomes() {
        let dir = TempDir::new().unwrap();
        let (engine, remote) = engine(&dir, live());

        let values = vec!["home".to_string(), "errands".to_string()];
        let data = ensure_option(&engine, "tasks", "Tags", &values).await.unwrap();
        assert_eq!(data["options"][0]["outcome"], "already_exists");
        assert_eq!(data["options"][1]["outcome"], "added");
        assert_eq!(remote.calls().patch_schema, 1);
    }

    #[test]
    fn test_stub_uses_latest_run() {
        let dir = TempDir::new().unwrap();
        let config = Config::new("unused.json", dir.path().to_string_lossy());
        let log = ChangeLog::new(config.paths().changes);
        let (old_run, new_run) = (Uuid::new_v4(), Uuid::new_v4());
        log.append(&[Change::new(
            "tasks",
            ChangeType::NewField,
            "Energy",
            None,
            "number",
            Utc::now(),
            old_run,
        )])
        .unwrap();
        log.append(&[Change::new(
            "tasks",
            ChangeType::NewEnumValue,
            "Tags",
            None,
            "errands",
            Utc::now(),
            new_run,
        )])
        .unwrap();

        let data = stub(&config, None).unwrap();
        assert_eq!(data["changes"], 1);
        let text = data["stub"].as_str().unwrap();
        assert!(text.contains("errands"));
        assert!(!text.contains("Energy"));
        assert!(config.paths().migration_stub.exists());

        let data = stub(&config, Some(&old_run.to_string())).unwrap();
        assert!(data["stub"].as_str().unwrap().contains("Energy"));
    }

    #[test]
    fn test_stub_rejects_bad_run_id() {
        let dir = TempDir::new().unwrap();
        let config = Config::new("unused.json", dir.path().to_string_lossy());
        let err = stub(&config, Some("not-a-uuid")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::InputError);
    }

    #[test]
    fn test_show_unknown_collection() {
        let err = show_declared(&store(), "habits").unwrap_err();
        assert_eq!(err.code_str(), "SG_SCHEMA_NOT_FOUND");
        assert!(show_declared(&store(), "tasks").unwrap()["declared"].is_object());
    }

    #[test]
    fn test_parse_filter() {
        let filter = parse_filter(
            r#"{"op":"equals","field":"Tags","value":{"type":"multi_enum","value":["home"]}}"#,
        )
        .unwrap();
        assert_eq!(
            filter,
            RecordFilter::equals("Tags", FieldValue::multi_select(&["home"]))
        );
        assert!(parse_filter("{}").is_err());
    }

    #[test]
    fn test_reset_guard() {
        let dir = TempDir::new().unwrap();
        let config = Config::new("unused.json", dir.path().to_string_lossy());
        reset_guard(&config).unwrap();
        let state = RunStateStore::new(config.paths().run_state).load().unwrap();
        assert_eq!(state.failed_attempts, 0);
    }
}
