//! Additive enum option extension
//!
//! The remote store only accepts a full replacement option list, so extending
//! is read-modify-write. Calls for the same (collection, field) are serialized
//! through an async mutex; a second caller waits, re-reads the live list and
//! sees the first caller's option.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::cache::SchemaCache;
use crate::errors::{EngineError, EngineResult, ValidationDetails};
use crate::observability::{Event, Logger};
use crate::remote::{with_timeout, RemoteStore};
use crate::schema::SchemaStore;

/// Per-value outcome of an extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionOutcome {
    AlreadyExists,
    Added,
}

type LockKey = (String, String);

/// Extends enum option sets of live remote collections.
pub struct OptionExtender {
    store: Arc<SchemaStore>,
    cache: Arc<SchemaCache>,
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
    locks: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl OptionExtender {
    pub fn new(
        store: Arc<SchemaStore>,
        cache: Arc<SchemaCache>,
        remote: Arc<dyn RemoteStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            remote,
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Makes `value` a live option of `field`. Idempotent.
    pub async fn ensure_option_exists(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> EngineResult<OptionOutcome> {
        let outcomes = self
            .ensure_options_exist(collection, field, &[value.to_string()])
            .await?;
        Ok(outcomes
            .into_iter()
            .next()
            .map(|(_, outcome)| outcome)
            .unwrap_or(OptionOutcome::AlreadyExists))
    }

    /// Makes every value a live option of `field` with at most one patch.
    ///
    /// Returns one outcome per distinct value, in input order.
    pub async fn ensure_options_exist(
        &self,
        collection: &str,
        field: &str,
        values: &[String],
    ) -> EngineResult<Vec<(String, OptionOutcome)>> {
        let schema = self.store.get(collection)?;
        match schema.field(field) {
            Some(spec) if spec.field_type.is_enum() => {}
            Some(spec) => {
                return Err(EngineError::Validation(ValidationDetails::wrong_type(
                    field,
                    "single_enum or multi_enum",
                    spec.field_type.type_name(),
                )))
            }
            None => return Err(EngineError::Validation(ValidationDetails::unknown_field(field))),
        }
        let remote_id = schema.remote_id.clone();

        let lock = self.lock_for(&remote_id, field);
        let _guard = lock.lock().await;

        let live = self.cache.get_schema(&remote_id, true).await?;
        if !live.properties.get(field).map_or(false, |t| t.is_enum()) {
            return Err(EngineError::WriteRejected(format!(
                "field '{}' of '{}' is not an enum field remotely",
                field, collection
            )));
        }

        let mut options = live.options(field).to_vec();
        let mut outcomes: Vec<(String, OptionOutcome)> = Vec::new();
        for value in values {
            if outcomes.iter().any(|(v, _)| v == value) {
                continue;
            }
            if options.contains(value) {
                outcomes.push((value.clone(), OptionOutcome::AlreadyExists));
            } else {
                options.push(value.clone());
                outcomes.push((value.clone(), OptionOutcome::Added));
            }
        }

        let added: Vec<&str> = outcomes
            .iter()
            .filter(|(_, o)| *o == OptionOutcome::Added)
            .map(|(v, _)| v.as_str())
            .collect();
        if added.is_empty() {
            Logger::trace(
                Event::OptionExists,
                &[("collection", collection), ("field", field)],
            );
            return Ok(outcomes);
        }

        let patched = with_timeout(
            self.timeout,
            self.remote.patch_schema(&remote_id, field, &options),
        )
        .await;
        if let Err(e) = patched {
            let err = EngineError::from(e);
            Logger::warn(
                Event::OptionExtendFailed,
                &[
                    ("collection", collection),
                    ("field", field),
                    ("error", &err.to_string()),
                ],
            );
            return Err(err);
        }
        self.cache.invalidate(&remote_id);

        Logger::info(
            Event::OptionAdded,
            &[
                ("collection", collection),
                ("field", field),
                ("options", &added.join(",")),
            ],
        );
        Ok(outcomes)
    }

    fn lock_for(&self, remote_id: &str, field: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry((remote_id.to_string(), field.to_string()))
            .or_default()
            .clone()
    }
}
