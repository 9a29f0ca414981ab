//! Live schema cache
//!
//! Two tiers in front of the remote store: an in-process map and one JSON file
//! per collection under the cache directory. An entry is fresh while
//! `now - fetched_at < ttl`; stale entries are replaced whole by a refetch.
//!
//! Lookup order for [`SchemaCache::get_schema`]:
//! 1. memory, if fresh
//! 2. disk, if fresh (populates memory)
//! 3. remote fetch, written through to disk and memory
//!
//! `force_refresh` skips straight to step 3.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::{EngineError, EngineResult};
use crate::observability::{Event, Logger};
use crate::remote::{with_timeout, RemoteError, RemoteStore, SchemaSnapshot};

/// A cached live schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub collection_id: String,
    pub snapshot: SchemaSnapshot,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.fetched_at) < ttl,
            // A TTL beyond chrono's range never expires.
            Err(_) => true,
        }
    }
}

/// TTL cache of live remote schemas
pub struct SchemaCache {
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    dir: PathBuf,
    ttl: Duration,
    timeout: Duration,
    memory: Mutex<HashMap<String, CacheEntry>>,
}

impl SchemaCache {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn Clock>,
        dir: impl Into<PathBuf>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            clock,
            dir: dir.into(),
            ttl,
            timeout,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the live schema of `collection_id`.
    ///
    /// # Errors
    ///
    /// - `SchemaNotFound` if the remote reports the collection absent
    /// - `RemoteUnavailable` if the fetch fails and no fresh entry exists
    pub async fn get_schema(
        &self,
        collection_id: &str,
        force_refresh: bool,
    ) -> EngineResult<SchemaSnapshot> {
        if !force_refresh {
            let now = self.clock.now();

            let cached = self.memory().get(collection_id).cloned();
            if let Some(entry) = cached {
                if entry.is_fresh(now, self.ttl) {
                    Logger::trace(Event::CacheHit, &[("collection_id", collection_id)]);
                    return Ok(entry.snapshot.clone());
                }
            }

            if let Some(entry) = self.read_disk(collection_id) {
                if entry.is_fresh(now, self.ttl) {
                    Logger::trace(Event::CacheDiskHit, &[("collection_id", collection_id)]);
                    let snapshot = entry.snapshot.clone();
                    self.memory().insert(collection_id.to_string(), entry);
                    return Ok(snapshot);
                }
            }
        }

        self.fetch(collection_id, force_refresh).await
    }

    /// Drops the memory and disk entries of `collection_id`.
    pub fn invalidate(&self, collection_id: &str) {
        self.memory().remove(collection_id);
        let path = self.entry_path(collection_id);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                Logger::warn(
                    Event::CacheWriteFailed,
                    &[
                        ("collection_id", collection_id),
                        ("path", &path.display().to_string()),
                        ("error", &e.to_string()),
                    ],
                );
            }
        }
        Logger::trace(Event::CacheInvalidated, &[("collection_id", collection_id)]);
    }

    async fn fetch(&self, collection_id: &str, forced: bool) -> EngineResult<SchemaSnapshot> {
        Logger::info(
            Event::CacheFetch,
            &[
                ("collection_id", collection_id),
                ("forced", if forced { "true" } else { "false" }),
            ],
        );

        let snapshot = with_timeout(self.timeout, self.remote.get_schema(collection_id))
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(_) => EngineError::SchemaNotFound(collection_id.to_string()),
                other => EngineError::RemoteUnavailable(format!("{}: {}", collection_id, other)),
            })?;

        let entry = CacheEntry {
            collection_id: collection_id.to_string(),
            snapshot: snapshot.clone(),
            fetched_at: self.clock.now(),
        };
        self.write_disk(&entry);
        self.memory().insert(collection_id.to_string(), entry);
        Ok(snapshot)
    }

    fn memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn entry_path(&self, collection_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(collection_id)))
    }

    /// Unreadable or corrupt files count as a miss.
    fn read_disk(&self, collection_id: &str) -> Option<CacheEntry> {
        let bytes = fs::read(self.entry_path(collection_id)).ok()?;
        let entry: CacheEntry = serde_json::from_slice(&bytes).ok()?;
        (entry.collection_id == collection_id).then_some(entry)
    }

    /// Failures are logged and swallowed; the memory tier still serves.
    fn write_disk(&self, entry: &CacheEntry) {
        let path = self.entry_path(&entry.collection_id);
        if let Err(e) = write_atomic(&self.dir, &path, entry) {
            Logger::warn(
                Event::CacheWriteFailed,
                &[
                    ("collection_id", &entry.collection_id),
                    ("path", &path.display().to_string()),
                    ("error", &e),
                ],
            );
        }
    }
}

fn write_atomic(dir: &Path, path: &Path, entry: &CacheEntry) -> Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let json = serde_json::to_vec_pretty(entry).map_err(|e| e.to_string())?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| e.to_string())?;
    fs::rename(&tmp, path).map_err(|e| e.to_string())
}

/// Keeps collection ids usable as file names.
fn sanitize(collection_id: &str) -> String {
    collection_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::remote::MemoryRemote;
    use crate::schema::FieldType;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn snapshot(options: &[&str]) -> SchemaSnapshot {
        SchemaSnapshot::new()
            .with_field("Статус", FieldType::SingleEnum)
            .with_options("Статус", options)
    }

    fn setup() -> (Arc<MemoryRemote>, Arc<ManualClock>, TempDir) {
        let remote = Arc::new(MemoryRemote::new().with_schema("db-tasks", snapshot(&["To do"])));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        (remote, clock, TempDir::new().unwrap())
    }

    fn cache(remote: &Arc<MemoryRemote>, clock: &Arc<ManualClock>, dir: &Path) -> SchemaCache {
        SchemaCache::new(
            remote.clone(),
            clock.clone(),
            dir,
            HOUR,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_fresh_entry_served_from_memory() {
        let (remote, clock, dir) = setup();
        let cache = cache(&remote, &clock, dir.path());

        cache.get_schema("db-tasks", false).await.unwrap();
        clock.advance(chrono::Duration::seconds(10));
        cache.get_schema("db-tasks", false).await.unwrap();

        assert_eq!(remote.calls().get_schema, 1);
    }

    #[tokio::test]
    async fn test_stale_entry_refetched() {
        let (remote, clock, dir) = setup();
        let cache = cache(&remote, &clock, dir.path());

        cache.get_schema("db-tasks", false).await.unwrap();
        remote.set_schema("db-tasks", snapshot(&["To do", "Done"]));
        clock.advance(chrono::Duration::seconds(3700));
        let live = cache.get_schema("db-tasks", false).await.unwrap();

        assert_eq!(remote.calls().get_schema, 2);
        assert!(live.has_option("Статус", "Done"));
    }

    #[tokio::test]
    async fn test_disk_tier_survives_restart() {
        let (remote, clock, dir) = setup();
        cache(&remote, &clock, dir.path())
            .get_schema("db-tasks", false)
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(60));
        let restarted = cache(&remote, &clock, dir.path());
        restarted.get_schema("db-tasks", false).await.unwrap();

        assert_eq!(remote.calls().get_schema, 1);
        assert!(dir.path().join("db-tasks.json").exists());
    }

    #[tokio::test]
    async fn test_disk_hit_keeps_original_fetch_time() {
        let (remote, clock, dir) = setup();
        cache(&remote, &clock, dir.path())
            .get_schema("db-tasks", false)
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(3000));
        let restarted = cache(&remote, &clock, dir.path());
        restarted.get_schema("db-tasks", false).await.unwrap();
        clock.advance(chrono::Duration::seconds(700));
        restarted.get_schema("db-tasks", false).await.unwrap();

        assert_eq!(remote.calls().get_schema, 2);
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let (remote, clock, dir) = setup();
        let cache = cache(&remote, &clock, dir.path());

        cache.get_schema("db-tasks", false).await.unwrap();
        cache.get_schema("db-tasks", true).await.unwrap();
        cache.get_schema("db-tasks", true).await.unwrap();

        assert_eq!(remote.calls().get_schema, 3);
    }

    #[tokio::test]
    async fn test_remote_errors_mapped() {
        let (remote, clock, dir) = setup();
        let cache = cache(&remote, &clock, dir.path());

        let err = cache.get_schema("db-missing", false).await.unwrap_err();
        assert!(matches!(err, EngineError::SchemaNotFound(_)));

        remote.set_unavailable("db-tasks", true);
        let err = cache.get_schema("db-tasks", false).await.unwrap_err();
        assert!(matches!(err, EngineError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disk_write_failure_swallowed() {
        let (remote, clock, dir) = setup();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"file").unwrap();
        let cache = cache(&remote, &clock, &blocker);

        let live = cache.get_schema("db-tasks", false).await.unwrap();
        assert!(live.has_option("Статус", "To do"));
        cache.get_schema("db-tasks", false).await.unwrap();
        assert_eq!(remote.calls().get_schema, 1);
    }

    #[tokio::test]
    async fn test_invalidate_drops_both_tiers() {
        let (remote, clock, dir) = setup();
        let cache = cache(&remote, &clock, dir.path());

        cache.get_schema("db-tasks", false).await.unwrap();
        cache.invalidate("db-tasks");
        assert!(!dir.path().join("db-tasks.json").exists());

        cache.get_schema("db-tasks", false).await.unwrap();
        assert_eq!(remote.calls().get_schema, 2);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("a1b2-c3_d4"), "a1b2-c3_d4");
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
    }
}
