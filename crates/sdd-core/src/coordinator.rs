//! Run Coordinator
//!
//! Owns the single active traceability run and tags file-change
//! notifications to it. Every mutation goes through the workspace
//! serialization point; if the ledger refuses a write, the registry is left
//! exactly as it was.

use crate::collab::{FileChange, FileSystem};
use crate::error::{SddError, SddResult};
use crate::types::{Run, RunStatus, StatusChange, TaskPointer};
use crate::workspace::Workspace;
use futures::{Stream, StreamExt};
use sdd_ledger::{DocRef, EventType, FileOp, LedgerEvent, LedgerSnapshot, RunId, RunRef};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Coordinates traceability runs for one workspace
#[derive(Debug, Clone)]
pub struct RunCoordinator {
    workspace: Arc<Workspace>,
}

impl RunCoordinator {
    #[must_use]
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    /// Start a run for a feature task, citing `inputs` as its documents
    ///
    /// # Errors
    /// - `Validation` for empty ids
    /// - `Conflict` if a run is already active (nothing is appended)
    /// - `Storage` if the ledger refuses the write
    pub fn start_run(
        &self,
        feature_id: &str,
        task_id: &str,
        inputs: Vec<DocRef>,
    ) -> SddResult<Run> {
        require_id("featureId", feature_id)?;
        require_id("taskId", task_id)?;

        let run = self.workspace.write(|registry, ledger| {
            if let Some(active) = &registry.active_run {
                return Err(SddError::Conflict(format!(
                    "run {} for {}/{} is already active",
                    active.run_id, active.feature_id, active.task_id
                )));
            }

            let run_ref = RunRef {
                run_id: RunId::new(),
                feature_id: feature_id.to_string(),
                task_id: task_id.to_string(),
            };
            let event = ledger.append(
                self.workspace
                    .draft(EventType::RunStarted)
                    .with_run(run_ref.clone())
                    .with_docs(inputs),
            )?;

            let run = Run::started(&run_ref, event.timestamp);
            registry.active_run = Some(run.clone());
            Ok(run)
        })?;

        tracing::info!(run_id = %run.run_id, feature = %run.feature_id, task = %run.task_id, "run started");
        self.workspace
            .notify(StatusChange::RunStarted { run: run.clone() });
        Ok(run)
    }

    /// Start a run citing `inputs`, hashed through `fs` as they are now
    ///
    /// # Errors
    /// `NotFound` if an input cannot be read, plus [`Self::start_run`] errors
    pub async fn start_run_citing(
        &self,
        fs: &dyn FileSystem,
        feature_id: &str,
        task_id: &str,
        inputs: &[String],
    ) -> SddResult<Run> {
        let mut docs = Vec::with_capacity(inputs.len());
        for path in inputs {
            let content = fs.read_file(path).await.map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => SddError::NotFound(format!("input document {path}")),
                _ => SddError::Validation(format!("cannot read input {path}: {e}")),
            })?;
            docs.push(DocRef::new(path.clone(), content.hash));
        }
        self.start_run(feature_id, task_id, docs)
    }

    /// Stop the active run; a no-op returning the last ended run otherwise
    ///
    /// # Errors
    /// `Storage` if the ledger refuses the write (the run stays active)
    pub fn stop_run(&self) -> SddResult<Option<Run>> {
        self.end_run(RunStatus::Stopped, None)
    }

    /// Abort the active run, recording `reason`
    ///
    /// # Errors
    /// `Storage` if the ledger refuses the write (the run stays active)
    pub fn abort_run(&self, reason: &str) -> SddResult<Option<Run>> {
        self.end_run(RunStatus::Aborted, Some(reason))
    }

    fn end_run(&self, status: RunStatus, reason: Option<&str>) -> SddResult<Option<Run>> {
        let ended = self.workspace.write(|registry, ledger| {
            let Some(active) = registry.active_run.as_ref() else {
                return Ok::<_, SddError>(None);
            };

            let kind = match status {
                RunStatus::Aborted => EventType::RunAborted,
                _ => EventType::RunStopped,
            };
            let mut draft = self.workspace.draft(kind).with_run(active.run_ref());
            if let Some(reason) = reason {
                draft = draft.with_metadata("reason", reason);
            }
            let event = ledger.append(draft)?;

            let mut run = registry.active_run.take().ok_or_else(|| {
                SddError::InvalidState("active run disappeared under the lock".to_string())
            })?;
            run.end(status, event.timestamp);
            registry.last_run = Some(run.clone());
            Ok(Some(run))
        })?;

        match ended {
            Some(run) => {
                tracing::info!(run_id = %run.run_id, status = ?run.status, "run ended");
                self.workspace
                    .notify(StatusChange::RunEnded { run: run.clone() });
                Ok(Some(run))
            }
            None => {
                tracing::debug!("stop requested with no active run");
                Ok(self.workspace.read(|registry| registry.last_run.clone()))
            }
        }
    }

    /// Record a file change, tagged to the active run if there is one
    ///
    /// # Errors
    /// `Validation` for an empty path, `Storage` on ledger failure
    pub fn on_file_change(&self, change: FileChange) -> SddResult<Arc<LedgerEvent>> {
        require_id("path", &change.path)?;
        let path = change.path.clone();
        let op = FileOp::new(change.path, change.op).with_hashes(change.hash_before, change.hash_after);

        let (event, tracked) = self.workspace.write(|registry, ledger| {
            let draft = match &registry.active_run {
                Some(run) => self
                    .workspace
                    .draft(EventType::FileChanged)
                    .with_run(run.run_ref()),
                None => self.workspace.draft(EventType::UntrackedChangeDetected),
            };
            let tracked = registry.active_run.is_some();
            ledger.append(draft.with_file_op(op)).map(|e| (e, tracked))
        })?;

        if tracked {
            tracing::debug!(%path, version = event.version, "tracked file change");
        } else {
            tracing::warn!(%path, version = event.version, "untracked file change");
        }
        self.workspace
            .notify(StatusChange::FileChanged { path, tracked });
        Ok(event)
    }

    /// Move the UI-facing current-task pointer; records nothing in the ledger
    ///
    /// # Errors
    /// `Validation` for empty ids
    pub fn set_active_task(&self, feature_id: &str, task_id: &str) -> SddResult<()> {
        require_id("featureId", feature_id)?;
        require_id("taskId", task_id)?;
        self.workspace.write(|registry, _| {
            registry.current_task = Some(TaskPointer {
                feature_id: feature_id.to_string(),
                task_id: task_id.to_string(),
            });
        });
        self.workspace.notify(StatusChange::ActiveTaskChanged {
            feature_id: feature_id.to_string(),
            task_id: task_id.to_string(),
        });
        Ok(())
    }

    #[must_use]
    pub fn current_task(&self) -> Option<TaskPointer> {
        self.workspace.read(|registry| registry.current_task.clone())
    }

    #[must_use]
    pub fn active_run(&self) -> Option<Run> {
        self.workspace.read(|registry| registry.active_run.clone())
    }

    /// Feed watcher notifications until the stream ends
    ///
    /// Returns how many changes were recorded. Validation failures are
    /// logged and skipped; a storage failure stops ingestion.
    pub async fn ingest<S>(&self, stream: S) -> usize
    where
        S: Stream<Item = FileChange> + Send,
    {
        let mut stream = std::pin::pin!(stream);
        let mut recorded = 0;
        while let Some(change) = stream.next().await {
            match self.on_file_change(change) {
                Ok(_) => recorded += 1,
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "stopping watch ingestion");
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "ignoring malformed file change"),
            }
        }
        recorded
    }

    /// Spawn [`Self::ingest`] on the runtime
    pub fn spawn_ingest<S>(&self, stream: S) -> JoinHandle<usize>
    where
        S: Stream<Item = FileChange> + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.ingest(stream).await })
    }
}

fn require_id(name: &str, value: &str) -> SddResult<()> {
    if value.trim().is_empty() {
        return Err(SddError::Validation(format!("{name} must not be empty")));
    }
    Ok(())
}

/// Rebuild every run's snapshot from the ledger
#[must_use]
pub fn replay_runs(snapshot: &LedgerSnapshot) -> HashMap<RunId, Run> {
    let mut runs = HashMap::new();
    for event in snapshot.iter() {
        let Some(run_ref) = &event.run else { continue };
        match event.kind {
            EventType::RunStarted => {
                runs.insert(run_ref.run_id, Run::started(run_ref, event.timestamp));
            }
            EventType::RunStopped | EventType::RunAborted => {
                if let Some(run) = runs.get_mut(&run_ref.run_id) {
                    let status = if event.kind == EventType::RunAborted {
                        RunStatus::Aborted
                    } else {
                        RunStatus::Stopped
                    };
                    run.end(status, event.timestamp);
                }
            }
            _ => {}
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdd_ledger::{ContentHash, FileOpKind, LedgerError, LedgerSink, LedgerStore};
    use std::io;

    fn coordinator() -> (Arc<Workspace>, RunCoordinator) {
        let workspace = Arc::new(Workspace::in_memory());
        (Arc::clone(&workspace), RunCoordinator::new(workspace))
    }

    fn count(workspace: &Workspace, kind: EventType) -> usize {
        workspace.snapshot().iter().filter(|e| e.kind == kind).count()
    }

    #[test]
    fn start_run_records_inputs() {
        let (workspace, coordinator) = coordinator();
        let doc = DocRef::new("specs/001/spec.md", ContentHash::compute(b"spec"));
        let run = coordinator.start_run("001", "T1", vec![doc.clone()]).unwrap();

        assert!(run.is_active());
        let snapshot = workspace.snapshot();
        let event = snapshot.iter().next().unwrap();
        assert_eq!(event.kind, EventType::RunStarted);
        assert_eq!(event.docs, vec![doc]);
        assert_eq!(event.run_id(), Some(run.run_id));
    }

    #[test]
    fn second_start_conflicts_without_event() {
        let (workspace, coordinator) = coordinator();
        coordinator.start_run("001", "T1", vec![]).unwrap();

        let err = coordinator.start_run("001", "T2", vec![]).unwrap_err();
        assert!(matches!(err, SddError::Conflict(_)));
        assert_eq!(count(&workspace, EventType::RunStarted), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let (workspace, coordinator) = coordinator();
        coordinator.start_run("001", "T1", vec![]).unwrap();

        let first = coordinator.stop_run().unwrap().unwrap();
        let second = coordinator.stop_run().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, RunStatus::Stopped);
        assert!(first.stopped_at.is_some());
        assert_eq!(count(&workspace, EventType::RunStopped), 1);
    }

    #[test]
    fn stop_without_any_run_is_noop() {
        let (workspace, coordinator) = coordinator();
        assert!(coordinator.stop_run().unwrap().is_none());
        assert!(workspace.snapshot().is_empty());
    }

    #[test]
    fn abort_records_reason() {
        let (workspace, coordinator) = coordinator();
        coordinator.start_run("001", "T1", vec![]).unwrap();
        let run = coordinator.abort_run("wrong task").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Aborted);

        let snapshot = workspace.snapshot();
        let last = snapshot.iter().last().unwrap();
        assert_eq!(last.kind, EventType::RunAborted);
        assert_eq!(last.metadata_str("reason"), Some("wrong task"));
    }

    #[test]
    fn file_changes_are_tagged_or_untracked() {
        let (_, coordinator) = coordinator();
        let untracked = coordinator
            .on_file_change(FileChange::new("src/a.rs", FileOpKind::Modify))
            .unwrap();
        assert_eq!(untracked.kind, EventType::UntrackedChangeDetected);
        assert!(untracked.run.is_none());

        let run = coordinator.start_run("001", "T1", vec![]).unwrap();
        let tracked = coordinator
            .on_file_change(FileChange::new("src/b.rs", FileOpKind::Create))
            .unwrap();
        assert_eq!(tracked.kind, EventType::FileChanged);
        assert_eq!(tracked.run_id(), Some(run.run_id));
    }

    #[test]
    fn active_task_pointer_writes_nothing() {
        let (workspace, coordinator) = coordinator();
        coordinator.set_active_task("001", "T3").unwrap();
        assert_eq!(coordinator.current_task().unwrap().task_id, "T3");
        assert!(workspace.snapshot().is_empty());
        assert!(coordinator.set_active_task("", "T3").is_err());
    }

    #[test]
    fn storage_failure_leaves_registry_unchanged() {
        #[derive(Debug)]
        struct BrokenDisk;
        impl LedgerSink for BrokenDisk {
            fn write_line(&mut self, _line: &[u8]) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::Other, "EIO"))
            }
        }

        let ledger = Arc::new(LedgerStore::with_sink(Box::new(BrokenDisk)));
        let coordinator = RunCoordinator::new(Arc::new(Workspace::new(ledger, "user")));
        let err = coordinator.start_run("001", "T1", vec![]).unwrap_err();
        assert!(matches!(err, SddError::Storage(LedgerError::Storage(_))));
        assert!(coordinator.active_run().is_none());
    }

    #[test]
    fn workspace_recovers_unfinished_run() {
        let ledger = Arc::new(LedgerStore::in_memory());
        let run = {
            let coordinator = RunCoordinator::new(Arc::new(Workspace::new(Arc::clone(&ledger), "user")));
            coordinator.start_run("001", "T1", vec![]).unwrap()
        };

        let coordinator = RunCoordinator::new(Arc::new(Workspace::new(ledger, "user")));
        assert_eq!(coordinator.active_run(), Some(run));
    }

    #[tokio::test]
    async fn ingest_records_stream() {
        let (workspace, coordinator) = coordinator();
        let changes = futures::stream::iter(vec![
            FileChange::new("a.rs", FileOpKind::Create),
            FileChange::new("", FileOpKind::Create),
            FileChange::new("b.rs", FileOpKind::Delete),
        ]);
        let recorded = coordinator.spawn_ingest(changes).await.unwrap();
        assert_eq!(recorded, 2);
        assert_eq!(workspace.snapshot().len(), 2);
    }
}
