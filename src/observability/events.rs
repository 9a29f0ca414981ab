//! Observable engine events
//!
//! Every log line the engine emits is keyed by one of these events.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    ConfigLoaded,
    SchemasLoaded,
    WatchStart,
    WatchTick,
    ShutdownStart,

    // Schema cache
    CacheHit,
    CacheDiskHit,
    CacheFetch,
    CacheWriteFailed,
    CacheInvalidated,

    // Drift scans
    ScanStart,
    ScanSkipped,
    ScanCollectionFailed,
    ScanCancelled,
    ScanComplete,
    /// Backup or change log could not be persisted (FATAL)
    ScanFailed,
    DriftDetected,
    BackupWritten,
    ChangesAppended,
    StubWritten,

    // Writes
    WriteRejected,
    WriteCommitted,
    WriteFailed,
    OptionExists,
    OptionAdded,
    OptionExtendFailed,
    VerifyWarning,

    // Notifications
    NotifySent,
    NotifyFailed,
}

impl Event {
    /// Returns the event name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemasLoaded => "SCHEMAS_LOADED",
            Event::WatchStart => "WATCH_START",
            Event::WatchTick => "WATCH_TICK",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::CacheHit => "CACHE_HIT",
            Event::CacheDiskHit => "CACHE_DISK_HIT",
            Event::CacheFetch => "CACHE_FETCH",
            Event::CacheWriteFailed => "CACHE_WRITE_FAILED",
            Event::CacheInvalidated => "CACHE_INVALIDATED",
            Event::ScanStart => "SCAN_START",
            Event::ScanSkipped => "SCAN_SKIPPED",
            Event::ScanCollectionFailed => "SCAN_COLLECTION_FAILED",
            Event::ScanCancelled => "SCAN_CANCELLED",
            Event::ScanComplete => "SCAN_COMPLETE",
            Event::ScanFailed => "SCAN_FAILED",
            Event::DriftDetected => "DRIFT_DETECTED",
            Event::BackupWritten => "BACKUP_WRITTEN",
            Event::ChangesAppended => "CHANGES_APPENDED",
            Event::StubWritten => "STUB_WRITTEN",
            Event::WriteRejected => "WRITE_REJECTED",
            Event::WriteCommitted => "WRITE_COMMITTED",
            Event::WriteFailed => "WRITE_FAILED",
            Event::OptionExists => "OPTION_EXISTS",
            Event::OptionAdded => "OPTION_ADDED",
            Event::OptionExtendFailed => "OPTION_EXTEND_FAILED",
            Event::VerifyWarning => "VERIFY_WARNING",
            Event::NotifySent => "NOTIFY_SENT",
            Event::NotifyFailed => "NOTIFY_FAILED",
        }
    }

    /// Returns true if this event indicates a failed scan
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ScanFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
