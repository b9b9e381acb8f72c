//! Core types for SDD
//!
//! Payload shapes exposed to callers. Field names serialize in camelCase to
//! match the host application's wire format.

use chrono::{DateTime, Utc};
use sdd_ledger::{RunId, RunRef};
use serde::{Deserialize, Serialize};

/// Traceability run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Stopped,
    Aborted,
}

/// A traceability session tying file edits to a feature task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub run_id: RunId,
    pub feature_id: String,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
}

impl Run {
    /// Run that started with the given reference at `started_at`
    #[must_use]
    pub fn started(run: &RunRef, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run.run_id,
            feature_id: run.feature_id.clone(),
            task_id: run.task_id.clone(),
            started_at,
            stopped_at: None,
            status: RunStatus::Running,
        }
    }

    /// Ledger reference for events recorded under this run
    #[must_use]
    pub fn run_ref(&self) -> RunRef {
        RunRef {
            run_id: self.run_id,
            feature_id: self.feature_id.clone(),
            task_id: self.task_id.clone(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub(crate) fn end(&mut self, status: RunStatus, at: DateTime<Utc>) {
        self.status = status;
        self.stopped_at = Some(at);
    }
}

/// A feature discovered in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub feature_id: String,
    pub spec_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_path: Option<String>,
}

impl Feature {
    /// Document paths that exist for this feature
    #[must_use]
    pub fn doc_paths(&self) -> Vec<&str> {
        std::iter::once(self.spec_path.as_str())
            .chain(self.plan_path.as_deref())
            .chain(self.tasks_path.as_deref())
            .collect()
    }
}

/// UI-facing "current task" pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPointer {
    pub feature_id: String,
    pub task_id: String,
}

/// Derived tracked/untracked picture of the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parity {
    pub tracked_file_changes: u64,
    pub untracked_file_changes: u64,
    pub tracked_ratio: f64,
    pub drift_files: Vec<String>,
    pub stale_docs: Vec<String>,
}

impl Parity {
    /// `tracked / (tracked + untracked)`, 1 when nothing changed
    #[must_use]
    pub fn ratio(tracked: u64, untracked: u64) -> f64 {
        let total = tracked + untracked;
        if total == 0 {
            1.0
        } else {
            tracked as f64 / total as f64
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.untracked_file_changes == 0 && self.stale_docs.is_empty()
    }
}

impl Default for Parity {
    fn default() -> Self {
        Self {
            tracked_file_changes: 0,
            untracked_file_changes: 0,
            tracked_ratio: 1.0,
            drift_files: Vec::new(),
            stale_docs: Vec::new(),
        }
    }
}

/// Commit guard verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Every untracked path in the current window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untracked_files: Option<Vec<String>>,
    /// Untracked paths not covered by a valid override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_files: Option<Vec<String>>,
}

/// Runs that touched a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTrace {
    pub path: String,
    pub runs: Vec<Run>,
}

/// Files and runs recorded for a feature task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTrace {
    pub files: Vec<String>,
    pub runs: Vec<Run>,
}

/// `status()` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub active_run: Option<Run>,
    pub parity: Parity,
}

/// Status-changed notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StatusChange {
    RunStarted { run: Run },
    RunEnded { run: Run },
    FileChanged { path: String, tracked: bool },
    ActiveTaskChanged { feature_id: String, task_id: String },
    CommitChecked { decision: CommitDecision },
    OverrideRecorded { reason: String, files: Vec<String> },
}
