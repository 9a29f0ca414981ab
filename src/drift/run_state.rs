//! Scan run guard
//!
//! Persists the outcome of the last scan so scheduled runs do not repeat a
//! successful scan on the same UTC day and stop retrying after too many
//! consecutive failures.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};

/// Outcome of the most recent scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Never,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub last_run_id: Option<Uuid>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    /// Consecutive failed runs since the last success
    pub failed_attempts: u32,
    pub last_error: Option<String>,
}

/// Whether a scheduled scan may start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunDecision {
    Proceed,
    AlreadySucceededToday { finished_at: DateTime<Utc> },
    /// Needs manual attention before scans resume
    TooManyFailures { attempts: u32 },
}

impl RunDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, RunDecision::Proceed)
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            RunDecision::Proceed => None,
            RunDecision::AlreadySucceededToday { finished_at } => Some(format!(
                "already succeeded today at {}",
                finished_at.format("%H:%M:%SZ")
            )),
            RunDecision::TooManyFailures { attempts } => Some(format!(
                "{} consecutive failed runs, manual attention required",
                attempts
            )),
        }
    }
}

impl RunState {
    /// A run left `Running` never finished; it counts as a failure.
    fn settled(mut self) -> Self {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Failed;
            self.failed_attempts += 1;
            self.last_error
                .get_or_insert_with(|| "previous run did not finish".to_string());
        }
        self
    }

    pub fn decide(&self, now: DateTime<Utc>, max_failed_attempts: u32) -> RunDecision {
        if self.status == RunStatus::Succeeded {
            if let Some(finished_at) = self.last_finished_at {
                if finished_at.date_naive() == now.date_naive() {
                    return RunDecision::AlreadySucceededToday { finished_at };
                }
            }
        }
        if self.failed_attempts > max_failed_attempts {
            return RunDecision::TooManyFailures {
                attempts: self.failed_attempts,
            };
        }
        RunDecision::Proceed
    }
}

/// JSON file holding the [`RunState`]
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file means no run has happened yet.
    pub fn load(&self) -> EngineResult<RunState> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<RunState>(&bytes)
                .map(RunState::settled)
                .map_err(|e| self.error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RunState::default()),
            Err(e) => Err(self.error(e)),
        }
    }

    pub fn save(&self, state: &RunState) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }
        let json = serde_json::to_vec_pretty(state).map_err(|e| self.error(e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.error(e))
    }

    pub fn record_start(&self, run_id: Uuid, now: DateTime<Utc>) -> EngineResult<RunState> {
        let mut state = self.load()?;
        state.status = RunStatus::Running;
        state.last_run_id = Some(run_id);
        state.last_started_at = Some(now);
        self.save(&state)?;
        Ok(state)
    }

    pub fn record_success(&self, now: DateTime<Utc>) -> EngineResult<RunState> {
        let mut state = self.load_raw()?;
        state.status = RunStatus::Succeeded;
        state.last_finished_at = Some(now);
        state.failed_attempts = 0;
        state.last_error = None;
        self.save(&state)?;
        Ok(state)
    }

    pub fn record_failure(&self, now: DateTime<Utc>, error: &str) -> EngineResult<RunState> {
        let mut state = self.load_raw()?;
        state.status = RunStatus::Failed;
        state.last_finished_at = Some(now);
        state.failed_attempts += 1;
        state.last_error = Some(error.to_string());
        self.save(&state)?;
        Ok(state)
    }

    /// Clears the failure counter after manual attention.
    pub fn reset(&self) -> EngineResult<()> {
        let mut state = self.load()?;
        state.failed_attempts = 0;
        state.last_error = None;
        self.save(&state)
    }

    /// State as written, without settling an in-flight run.
    fn load_raw(&self) -> EngineResult<RunState> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RunState::default()),
            Err(e) => Err(self.error(e)),
        }
    }

    fn error(&self, e: impl std::fmt::Display) -> EngineError {
        EngineError::local_state(self.path.display().to_string(), e)
    }
}
