//! Trace Query Service
//!
//! Read-only lookups from files and tasks back to the runs that produced
//! them, answered from a ledger snapshot.

use crate::coordinator::replay_runs;
use crate::error::{SddError, SddResult};
use crate::types::{FileTrace, TaskTrace};
use crate::workspace::Workspace;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TraceQueryService {
    workspace: Arc<Workspace>,
}

impl TraceQueryService {
    #[must_use]
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Runs that touched `path`, in order of first touch
    ///
    /// # Errors
    /// `Validation` for an empty path
    pub fn get_file_trace(&self, path: &str) -> SddResult<FileTrace> {
        if path.trim().is_empty() {
            return Err(SddError::Validation("path must not be empty".to_string()));
        }
        let snapshot = self.workspace.snapshot();
        let runs = replay_runs(&snapshot);
        let touched = snapshot.query_by_file(path);
        Ok(FileTrace {
            path: path.to_string(),
            runs: touched
                .iter()
                .filter_map(|r| runs.get(&r.run_id).cloned())
                .collect(),
        })
    }

    /// Files and runs recorded for a feature task
    ///
    /// # Errors
    /// `Validation` for empty ids
    pub fn get_task_trace(&self, feature_id: &str, task_id: &str) -> SddResult<TaskTrace> {
        if feature_id.trim().is_empty() || task_id.trim().is_empty() {
            return Err(SddError::Validation("featureId and taskId must not be empty".to_string()));
        }
        let snapshot = self.workspace.snapshot();
        let runs = replay_runs(&snapshot);
        let touches = snapshot.query_by_feature_task(feature_id, task_id);
        Ok(TaskTrace {
            files: touches.files,
            runs: touches
                .runs
                .iter()
                .filter_map(|r| runs.get(&r.run_id).cloned())
                .collect(),
        })
    }
}
