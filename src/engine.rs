//! Engine assembly
//!
//! Builds every component from a [`Config`] and hands out shared handles.
//! The remote store, notifier and clock are injected so the same wiring runs
//! against Notion in production and [`crate::remote::MemoryRemote`] in tests.

use std::path::Path;
use std::sync::Arc;

use crate::cache::SchemaCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StatePaths};
use crate::drift::{ChangeLog, DriftDetector, RunStateStore};
use crate::errors::{EngineError, EngineResult};
use crate::notify::{FanoutSink, LogSink, NotifySink, WebhookSink};
use crate::observability::{log_event, Event};
use crate::remote::{with_timeout, NotionClient, NotionSettings, Record, RecordFilter, RemoteStore};
use crate::schema::SchemaStore;
use crate::writer::{OptionExtender, ValidatingWriter};

/// Fully wired schema engine
pub struct Engine {
    config: Config,
    paths: StatePaths,
    store: Arc<SchemaStore>,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<SchemaCache>,
    extender: Arc<OptionExtender>,
    writer: ValidatingWriter,
    detector: DriftDetector,
}

impl Engine {
    /// Wires the engine around an already loaded schema store.
    pub fn new(
        config: Config,
        store: SchemaStore,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn NotifySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let paths = config.paths();
        let store = Arc::new(store);
        let timeout = config.remote_timeout();

        let cache = Arc::new(SchemaCache::new(
            remote.clone(),
            clock.clone(),
            &paths.cache_dir,
            config.cache_ttl(),
            timeout,
        ));
        let extender = Arc::new(OptionExtender::new(
            store.clone(),
            cache.clone(),
            remote.clone(),
            timeout,
        ));
        let writer = ValidatingWriter::new(
            store.clone(),
            cache.clone(),
            remote.clone(),
            extender.clone(),
            config.write_policy,
            timeout,
        );
        let detector = DriftDetector::new(
            store.clone(),
            cache.clone(),
            Arc::new(ChangeLog::new(&paths.changes)),
            RunStateStore::new(&paths.run_state),
            &paths.backups_dir,
            notifier,
            clock,
        )
        .with_max_failed_attempts(config.max_failed_attempts)
        .with_stub_path(&paths.migration_stub);

        Self {
            config,
            paths,
            store,
            remote,
            cache,
            extender,
            writer,
            detector,
        }
    }

    /// Production wiring: schema file, Notion client, log and webhook sinks.
    pub fn from_config(config: Config) -> EngineResult<Self> {
        config.validate()?;
        let store = SchemaStore::load(Path::new(&config.schema_path))?;
        log_event(
            Event::SchemasLoaded,
            &[
                ("collections", &store.len().to_string()),
                ("version", store.version()),
            ],
        );

        let settings = NotionSettings::new(config.credential()?)
            .with_api_base(&config.notion_api_base)
            .with_version(&config.notion_version)
            .with_timeout(config.remote_timeout());
        let remote: Arc<dyn RemoteStore> = Arc::new(
            NotionClient::new(settings)
                .map_err(|e| EngineError::Configuration(format!("remote client: {}", e)))?,
        );

        let notifier = build_notifier(&config)?;
        Ok(Self::new(config, store, remote, notifier, Arc::new(SystemClock)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn writer(&self) -> &ValidatingWriter {
        &self.writer
    }

    pub fn extender(&self) -> &OptionExtender {
        &self.extender
    }

    pub fn detector(&self) -> &DriftDetector {
        &self.detector
    }

    /// Records of a declared collection, optionally filtered.
    pub async fn query(
        &self,
        collection: &str,
        filter: Option<&RecordFilter>,
    ) -> EngineResult<Vec<Record>> {
        let schema = self.store.get(collection)?;
        let records = with_timeout(
            self.config.remote_timeout(),
            self.remote.query(&schema.remote_id, filter),
        )
        .await?;
        Ok(records)
    }
}

/// Log sink always, webhook sink when configured.
fn build_notifier(config: &Config) -> EngineResult<Arc<dyn NotifySink>> {
    let mut fanout = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(url) = &config.webhook_url {
        let webhook = WebhookSink::new(url, config.remote_timeout())
            .map_err(|e| EngineError::Configuration(format!("webhook sink: {}", e)))?;
        fanout = fanout.with(Arc::new(webhook));
    }
    Ok(Arc::new(fanout))
}
