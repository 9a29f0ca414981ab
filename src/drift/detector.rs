//! Drift detection and scan orchestration
//!
//! A scan walks the declared collections in declaration order, force-refreshes
//! each live schema, diffs it against the declaration and appends the
//! resulting changes to the change log.
//!
//! # Failure policy
//!
//! - A fetch failure for one collection is a partial error; the scan goes on
//! - Failing to write the backup or the change log aborts the scan
//! - The cancellation flag is checked between collections; changes already
//!   appended stay appended

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cache::SchemaCache;
use crate::clock::Clock;
use crate::errors::EngineResult;
use crate::notify::{NotifySeverity, NotifySink};
use crate::observability::{Event, Logger};
use crate::schema::{CollectionSchema, SchemaBackup, SchemaStore};

use super::change::Change;
use super::changelog::ChangeLog;
use super::migration::{generate_migration_stub, write_migration_stub};
use super::run_state::{RunDecision, RunStateStore};
use super::shape::SchemaShape;

/// Default bound on consecutive failed runs before scans pause
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

/// Number of changes listed in a summary notification
const SUMMARY_LIMIT: usize = 3;

/// A collection whose live schema could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionError {
    pub collection: String,
    pub message: String,
}

/// Result of one detection pass
#[derive(Debug, Clone)]
pub struct DriftOutcome {
    pub run_id: Uuid,
    pub changes: Vec<Change>,
    pub errors: Vec<CollectionError>,
    pub cancelled: bool,
    pub backup_path: PathBuf,
}

/// Result of [`DriftDetector::run_scan`]
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub changes: Vec<Change>,
    pub errors: Vec<CollectionError>,
    /// Why the run guard skipped this scan
    pub skipped: Option<String>,
    pub cancelled: bool,
    /// Critical failure that aborted the scan
    pub failure: Option<String>,
    pub backup_path: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl ScanReport {
    fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            changes: Vec::new(),
            errors: Vec::new(),
            skipped: None,
            cancelled: false,
            failure: None,
            backup_path: None,
            elapsed_ms: 0,
        }
    }

    /// Ran to completion without any error
    pub fn succeeded(&self) -> bool {
        self.skipped.is_none() && self.failure.is_none() && !self.cancelled && self.errors.is_empty()
    }
}

/// Compares live remote schemas against the schema store.
pub struct DriftDetector {
    store: Arc<SchemaStore>,
    cache: Arc<SchemaCache>,
    changelog: Arc<ChangeLog>,
    run_state: RunStateStore,
    backup_dir: PathBuf,
    stub_path: Option<PathBuf>,
    notifier: Arc<dyn NotifySink>,
    clock: Arc<dyn Clock>,
    max_failed_attempts: u32,
}

impl DriftDetector {
    pub fn new(
        store: Arc<SchemaStore>,
        cache: Arc<SchemaCache>,
        changelog: Arc<ChangeLog>,
        run_state: RunStateStore,
        backup_dir: impl Into<PathBuf>,
        notifier: Arc<dyn NotifySink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            changelog,
            run_state,
            backup_dir: backup_dir.into(),
            stub_path: None,
            notifier,
            clock,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
        }
    }

    pub fn with_max_failed_attempts(mut self, max: u32) -> Self {
        self.max_failed_attempts = max;
        self
    }

    /// Regenerates the migration draft at `path` whenever a scan finds drift.
    pub fn with_stub_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stub_path = Some(path.into());
        self
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    pub fn run_state(&self) -> &RunStateStore {
        &self.run_state
    }

    /// Diffs one collection against its live schema.
    pub async fn detect_collection(
        &self,
        collection: &CollectionSchema,
        run_id: Uuid,
    ) -> EngineResult<Vec<Change>> {
        let live = self.cache.get_schema(&collection.remote_id, true).await?;
        let declared = SchemaShape::from_collection(collection);
        let now = self.clock.now();

        let changes: Vec<Change> = declared
            .diff(&SchemaShape::from_snapshot(&live))
            .into_iter()
            .map(|d| {
                Change::new(
                    &collection.name,
                    d.change_type,
                    d.field_name,
                    d.old_value,
                    d.new_value,
                    now,
                    run_id,
                )
            })
            .collect();

        if !changes.is_empty() {
            Logger::info(
                Event::DriftDetected,
                &[
                    ("collection", &collection.name),
                    ("changes", &changes.len().to_string()),
                ],
            );
        }
        Ok(changes)
    }

    /// Backs up the schema store, then detects and logs drift collection by
    /// collection.
    ///
    /// # Errors
    ///
    /// Only backup and change log failures; fetch failures are reported in
    /// [`DriftOutcome::errors`].
    pub async fn run(&self, run_id: Uuid, cancel: &AtomicBool) -> EngineResult<DriftOutcome> {
        let backup = SchemaBackup::capture(&self.store, run_id, self.clock.now())?;
        let backup_path = backup.write_to(&self.backup_dir)?;
        Logger::info(
            Event::BackupWritten,
            &[("path", &backup_path.display().to_string())],
        );

        let mut outcome = DriftOutcome {
            run_id,
            changes: Vec::new(),
            errors: Vec::new(),
            cancelled: false,
            backup_path,
        };

        for collection in self.store.collections() {
            if cancel.load(Ordering::SeqCst) {
                Logger::warn(
                    Event::ScanCancelled,
                    &[("next_collection", &collection.name)],
                );
                outcome.cancelled = true;
                break;
            }

            match self.detect_collection(collection, run_id).await {
                Ok(changes) => {
                    self.changelog.append(&changes)?;
                    outcome.changes.extend(changes);
                }
                Err(e) => {
                    Logger::warn(
                        Event::ScanCollectionFailed,
                        &[
                            ("collection", &collection.name),
                            ("code", e.code()),
                            ("error", &e.to_string()),
                        ],
                    );
                    outcome.errors.push(CollectionError {
                        collection: collection.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Full guarded scan: run guard, notifications, detection, run bookkeeping.
    ///
    /// `force` bypasses the run guard. Never returns an error; failures are
    /// reported in the [`ScanReport`].
    pub async fn run_scan(&self, force: bool, cancel: &AtomicBool) -> ScanReport {
        let timer = Instant::now();
        let mut report = ScanReport::new(Uuid::new_v4(), self.clock.now());
        let run_id = report.run_id.to_string();

        if !force {
            let decision = match self.run_state.load() {
                Ok(state) => state.decide(report.started_at, self.max_failed_attempts),
                Err(e) => {
                    self.fail(&mut report, &e.to_string()).await;
                    report.elapsed_ms = elapsed_ms(timer);
                    return report;
                }
            };
            if let Some(reason) = decision.reason() {
                Logger::info(Event::ScanSkipped, &[("reason", &reason)]);
                if let RunDecision::TooManyFailures { .. } = decision {
                    self.notifier
                        .send(&format!("Schema scan skipped: {}", reason), NotifySeverity::Warning)
                        .await;
                }
                report.skipped = Some(reason);
                report.elapsed_ms = elapsed_ms(timer);
                return report;
            }
        }

        if let Err(e) = self.run_state.record_start(report.run_id, report.started_at) {
            self.fail(&mut report, &e.to_string()).await;
            report.elapsed_ms = elapsed_ms(timer);
            return report;
        }

        Logger::info(
            Event::ScanStart,
            &[
                ("run_id", &run_id),
                ("collections", &self.store.len().to_string()),
                ("forced", if force { "true" } else { "false" }),
            ],
        );
        self.notifier
            .send(
                &format!("Schema scan started: {} collections", self.store.len()),
                NotifySeverity::Info,
            )
            .await;

        match self.run(report.run_id, cancel).await {
            Ok(outcome) => {
                report.changes = outcome.changes;
                report.errors = outcome.errors;
                report.cancelled = outcome.cancelled;
                report.backup_path = Some(outcome.backup_path);
            }
            Err(e) => {
                Logger::fatal(
                    Event::ScanFailed,
                    &[("run_id", &run_id), ("code", e.code()), ("error", &e.to_string())],
                );
                self.fail(&mut report, &e.to_string()).await;
                report.elapsed_ms = elapsed_ms(timer);
                return report;
            }
        }

        self.write_stub(&report.changes);
        self.notifier
            .send(&summary_message(&report.changes), NotifySeverity::Info)
            .await;
        if !report.errors.is_empty() {
            self.notifier
                .send(&errors_message(&report.errors), NotifySeverity::Warning)
                .await;
        }

        let finished_at = self.clock.now();
        let recorded = if report.succeeded() {
            self.run_state.record_success(finished_at)
        } else if report.cancelled {
            self.run_state.record_failure(finished_at, "cancelled")
        } else {
            self.run_state.record_failure(
                finished_at,
                &format!("{} collection(s) failed", report.errors.len()),
            )
        };
        if let Err(e) = recorded {
            Logger::error(Event::ScanFailed, &[("run_id", &run_id), ("error", &e.to_string())]);
        }

        report.elapsed_ms = elapsed_ms(timer);
        Logger::info(
            Event::ScanComplete,
            &[
                ("run_id", &run_id),
                ("changes", &report.changes.len().to_string()),
                ("errors", &report.errors.len().to_string()),
                ("cancelled", if report.cancelled { "true" } else { "false" }),
                ("elapsed_ms", &report.elapsed_ms.to_string()),
            ],
        );
        report
    }

    async fn fail(&self, report: &mut ScanReport, error: &str) {
        report.failure = Some(error.to_string());
        self.notifier
            .send(&format!("Schema scan failed: {}", error), NotifySeverity::Critical)
            .await;
        if let Err(e) = self.run_state.record_failure(self.clock.now(), error) {
            Logger::error(Event::ScanFailed, &[("error", &e.to_string())]);
        }
    }

    fn write_stub(&self, changes: &[Change]) {
        let Some(path) = &self.stub_path else { return };
        if changes.is_empty() {
            return;
        }
        let stub = generate_migration_stub(changes, self.clock.now());
        if let Err(e) = write_migration_stub(path, &stub) {
            Logger::warn(Event::StubWritten, &[("error", &e.to_string())]);
        }
    }
}

fn elapsed_ms(timer: Instant) -> u64 {
    u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// "no changes", or the first few changes and a remainder count
pub fn summary_message(changes: &[Change]) -> String {
    if changes.is_empty() {
        return "Schema scan finished: no changes".to_string();
    }
    let mut message = format!("Schema drift detected: {} change(s)", changes.len());
    for change in changes.iter().take(SUMMARY_LIMIT) {
        message.push_str("\n- ");
        message.push_str(&change.summary());
    }
    if changes.len() > SUMMARY_LIMIT {
        message.push_str(&format!("\n... and {} more", changes.len() - SUMMARY_LIMIT));
    }
    message
}

fn errors_message(errors: &[CollectionError]) -> String {
    let listed: Vec<String> = errors
        .iter()
        .map(|e| format!("{} ({})", e.collection, e.message))
        .collect();
    format!(
        "Schema scan incomplete: {} collection(s) failed: {}",
        errors.len(),
        listed.join("; ")
    )
}
