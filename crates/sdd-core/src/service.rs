//! Service facade
//!
//! One entry point per workspace that wires the components to their
//! collaborators and exposes the request/response surface used by hosts.

use crate::collab::{FileChange, FileSystem, StepExecutor, TestOutcome, TestRunner};
use crate::config::{SddConfig, Settings};
use crate::coordinator::RunCoordinator;
use crate::error::SddResult;
use crate::features::FeatureCatalog;
use crate::guard::CommitGuard;
use crate::parity::ParityEngine;
use crate::trace::TraceQueryService;
use crate::types::{CommitDecision, Feature, FileTrace, Parity, Run, Status, StatusChange, TaskTrace};
use crate::workflow::{
    ApplyReport, ControlAction, Proposal, Step, Subscription, WorkflowEngine, WorkflowRun,
};
use crate::workspace::Workspace;
use sdd_ledger::{LedgerEvent, RunId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// External collaborators a service is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub fs: Arc<dyn FileSystem>,
    pub executor: Arc<dyn StepExecutor>,
    pub tests: Arc<dyn TestRunner>,
    pub settings: Arc<dyn Settings>,
    pub features: Arc<dyn FeatureCatalog>,
}

/// Traceability and workflow operations for one workspace
#[derive(Clone)]
pub struct SddService {
    workspace: Arc<Workspace>,
    fs: Arc<dyn FileSystem>,
    features: Arc<dyn FeatureCatalog>,
    coordinator: RunCoordinator,
    parity: ParityEngine,
    guard: CommitGuard,
    traces: TraceQueryService,
    workflow: WorkflowEngine,
}

impl std::fmt::Debug for SddService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SddService")
            .field("workspace", &self.workspace)
            .field("workflow", &self.workflow)
            .finish_non_exhaustive()
    }
}

impl SddService {
    #[must_use]
    pub fn new(workspace: Arc<Workspace>, collab: Collaborators, config: &SddConfig) -> Self {
        Self {
            coordinator: RunCoordinator::new(Arc::clone(&workspace)),
            parity: ParityEngine::new(Arc::clone(&workspace)).with_file_system(Arc::clone(&collab.fs)),
            guard: CommitGuard::new(Arc::clone(&workspace), collab.settings),
            traces: TraceQueryService::new(Arc::clone(&workspace)),
            workflow: WorkflowEngine::new(
                Arc::clone(&workspace),
                collab.executor,
                Arc::clone(&collab.fs),
                collab.tests,
                config.workflow,
            ),
            fs: collab.fs,
            features: collab.features,
            workspace,
        }
    }

    #[must_use]
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    #[must_use]
    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    /// # Errors
    /// Propagates catalog failures
    pub async fn list_features(&self) -> SddResult<Vec<Feature>> {
        self.features.list_features().await
    }

    /// Active run and parity of the current window
    pub async fn status(&self) -> Status {
        Status {
            active_run: self.coordinator.active_run(),
            parity: self.parity.compute().await,
        }
    }

    /// Start a run citing `inputs`, hashed as they are on disk now
    ///
    /// # Errors
    /// See [`RunCoordinator::start_run_citing`]
    pub async fn start_run(&self, feature_id: &str, task_id: &str, inputs: &[String]) -> SddResult<Run> {
        self.coordinator
            .start_run_citing(self.fs.as_ref(), feature_id, task_id, inputs)
            .await
    }

    /// # Errors
    /// See [`RunCoordinator::stop_run`]
    pub fn stop_run(&self) -> SddResult<Option<Run>> {
        self.coordinator.stop_run()
    }

    /// # Errors
    /// See [`RunCoordinator::abort_run`]
    pub fn abort_run(&self, reason: &str) -> SddResult<Option<Run>> {
        self.coordinator.abort_run(reason)
    }

    /// # Errors
    /// See [`RunCoordinator::set_active_task`]
    pub fn set_active_task(&self, feature_id: &str, task_id: &str) -> SddResult<()> {
        self.coordinator.set_active_task(feature_id, task_id)
    }

    /// # Errors
    /// See [`RunCoordinator::on_file_change`]
    pub fn on_file_change(&self, change: FileChange) -> SddResult<Arc<LedgerEvent>> {
        self.coordinator.on_file_change(change)
    }

    /// # Errors
    /// `Validation` for an empty path
    pub fn get_file_trace(&self, path: &str) -> SddResult<FileTrace> {
        self.traces.get_file_trace(path)
    }

    /// # Errors
    /// `Validation` for empty ids
    pub fn get_task_trace(&self, feature_id: &str, task_id: &str) -> SddResult<TaskTrace> {
        self.traces.get_task_trace(feature_id, task_id)
    }

    pub async fn get_parity(&self) -> Parity {
        self.parity.compute().await
    }

    /// # Errors
    /// See [`ParityEngine::override_untracked`]
    pub fn override_untracked(&self, reason: &str) -> SddResult<Vec<String>> {
        self.parity.override_untracked(reason)
    }

    /// # Errors
    /// See [`CommitGuard::check_commit`]
    pub fn check_commit(&self) -> SddResult<CommitDecision> {
        self.guard.check_commit()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.workspace.subscribe_status()
    }

    /// Feed the file system's watch stream for `root` into the coordinator
    pub fn spawn_watch(&self, root: &str) -> JoinHandle<usize> {
        self.coordinator.spawn_ingest(self.fs.watch(root))
    }

    /// # Errors
    /// See [`WorkflowEngine::start`]
    pub async fn start_workflow(
        &self,
        feature_id: &str,
        goal: &str,
        step: Option<Step>,
        connection_id: Option<String>,
    ) -> SddResult<WorkflowRun> {
        self.workflow.start(feature_id, goal, step, connection_id).await
    }

    /// # Errors
    /// See [`WorkflowEngine::control`]
    pub async fn control(&self, run_id: RunId, action: ControlAction, reason: Option<String>) -> SddResult<WorkflowRun> {
        self.workflow.control(run_id, action, reason).await
    }

    /// # Errors
    /// See [`WorkflowEngine::apply_proposal`]
    pub async fn apply_proposal(&self, run_id: RunId, proposal: Proposal) -> SddResult<ApplyReport> {
        self.workflow.apply_proposal(run_id, proposal).await
    }

    /// # Errors
    /// See [`WorkflowEngine::run_tests`]
    pub async fn run_tests(&self, run_id: RunId, command: &str) -> SddResult<TestOutcome> {
        self.workflow.run_tests(run_id, command).await
    }

    /// # Errors
    /// See [`WorkflowEngine::subscribe`]
    pub fn subscribe_workflow(&self, run_id: Option<RunId>) -> SddResult<Subscription> {
        self.workflow.subscribe(run_id)
    }
}
