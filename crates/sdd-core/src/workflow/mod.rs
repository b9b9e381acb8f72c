//! Workflow Engine
//!
//! Walks a feature through spec, plan, tasks, implement and review by
//! driving an external [`StepExecutor`]. Executor output is relayed as
//! [`WorkflowEvent`]s, proposals are applied through the [`FileSystem`]
//! collaborator, and every event is persisted to the ledger and fanned out
//! to subscribers.
//!
//! Each attempt carries a generation number. Cancel and retry bump it, and
//! anything an older attempt produces afterwards is discarded under the
//! workspace lock, which also guarantees one terminal event per attempt.

pub mod cancel;
pub mod event;
pub mod hub;
pub mod state_machine;

pub use cancel::CancelToken;
pub use event::{
    ApplyReport, FileWrite, Proposal, ProposalSummary, Step, WorkflowEvent, WorkflowEventKind,
    WorkflowStatus, WriteResult, WriteStatus,
};
pub use hub::{EventHub, Subscription};

use crate::collab::{FileSystem, StepExecutor, StepOutput, StepRequest, TestOutcome, TestRunner};
use crate::config::{ApplyPolicy, WorkflowConfig};
use crate::error::{SddError, SddResult};
use crate::workspace::{Registry, Workspace};
use chrono::Utc;
use futures::StreamExt;
use sdd_ledger::{EventType, LedgerStore, RunId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_CANCEL_MESSAGE: &str = "canceled by user";

/// Workflow bookkeeping kept in the workspace registry
#[derive(Debug, Default)]
pub(crate) struct WorkflowRegistry {
    active: Option<RunId>,
    runs: HashMap<RunId, WorkflowRunState>,
    /// Finished runs, oldest first
    finished: VecDeque<RunId>,
    next_event_id: u64,
}

#[derive(Debug)]
struct WorkflowRunState {
    run_id: RunId,
    feature_id: String,
    goal: String,
    step: Step,
    status: WorkflowStatus,
    pending: Option<Proposal>,
    generation: u64,
    cancel: CancelToken,
    connection_id: Option<String>,
    executor_done: bool,
    applying: bool,
    last_summary: Option<ProposalSummary>,
}

impl WorkflowRunState {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.status == WorkflowStatus::Running
    }

    fn snapshot(&self) -> WorkflowRun {
        WorkflowRun {
            run_id: self.run_id,
            feature_id: self.feature_id.clone(),
            goal: self.goal.clone(),
            step: self.step,
            status: self.status,
            pending_proposal: self.pending.clone(),
            generation: self.generation,
            connection_id: self.connection_id.clone(),
        }
    }

    fn request(&self) -> StepRequest {
        StepRequest {
            feature_id: self.feature_id.clone(),
            goal: self.goal.clone(),
            step: self.step,
        }
    }
}

/// Snapshot of a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub run_id: RunId,
    pub feature_id: String,
    pub goal: String,
    pub step: Step,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_proposal: Option<Proposal>,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

/// `control` actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Cancel,
    Retry,
}

impl FromStr for ControlAction {
    type Err = SddError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(Self::Cancel),
            "retry" => Ok(Self::Retry),
            other => Err(SddError::Validation(format!("unknown control action: {other}"))),
        }
    }
}

struct Shared {
    workspace: Arc<Workspace>,
    hub: EventHub,
    executor: Arc<dyn StepExecutor>,
    fs: Arc<dyn FileSystem>,
    tests: Arc<dyn TestRunner>,
    policy: ApplyPolicy,
    retained_runs: usize,
}

/// Drives workflow runs for one workspace
#[derive(Clone)]
pub struct WorkflowEngine {
    shared: Arc<Shared>,
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("policy", &self.shared.policy)
            .field("hub", &self.shared.hub)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    #[must_use]
    pub fn new(
        workspace: Arc<Workspace>,
        executor: Arc<dyn StepExecutor>,
        fs: Arc<dyn FileSystem>,
        tests: Arc<dyn TestRunner>,
        config: WorkflowConfig,
    ) -> Self {
        // Keep event ids increasing across sessions sharing one ledger
        let last_id = workspace
            .snapshot()
            .iter()
            .rev()
            .filter(|e| e.kind == EventType::WorkflowEvent)
            .find_map(|e| e.metadata.get("event")?.get("id")?.as_u64())
            .unwrap_or(0);
        workspace.write(|registry, _| {
            registry.workflows.next_event_id = registry.workflows.next_event_id.max(last_id);
        });

        Self {
            shared: Arc::new(Shared {
                workspace,
                hub: EventHub::new(config.history_window, config.subscriber_capacity),
                executor,
                fs,
                tests,
                policy: config.apply_policy,
                retained_runs: config.retained_runs,
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> ApplyPolicy {
        self.shared.policy
    }

    /// Start a workflow run and spawn its first attempt
    ///
    /// # Errors
    /// - `Validation` for an empty feature id
    /// - `Conflict` if a workflow run is already active
    pub async fn start(
        &self,
        feature_id: &str,
        goal: &str,
        step: Option<Step>,
        connection_id: Option<String>,
    ) -> SddResult<WorkflowRun> {
        if feature_id.trim().is_empty() {
            return Err(SddError::Validation("featureId must not be empty".to_string()));
        }

        let (run, request, cancel) = self.shared.workspace.write(|registry, ledger| {
            if let Some(active) = registry.workflows.active {
                return Err(SddError::Conflict(format!("workflow run {active} is already active")));
            }
            state_machine::validate_transition(WorkflowStatus::Idle, WorkflowStatus::Running)?;

            let state = WorkflowRunState {
                run_id: RunId::new(),
                feature_id: feature_id.to_string(),
                goal: goal.to_string(),
                step: step.unwrap_or(Step::Spec),
                status: WorkflowStatus::Running,
                pending: None,
                generation: 1,
                cancel: CancelToken::new(),
                connection_id,
                executor_done: false,
                applying: false,
                last_summary: None,
            };
            let run_id = state.run_id;
            let started = WorkflowEventKind::Started {
                feature_id: state.feature_id.clone(),
                goal: state.goal.clone(),
                step: state.step,
                connection_id: state.connection_id.clone(),
            };
            let out = (state.snapshot(), state.request(), state.cancel.clone());
            registry.workflows.runs.insert(run_id, state);
            registry.workflows.active = Some(run_id);
            self.emit(registry, ledger, run_id, started);
            Ok(out)
        })?;

        tracing::info!(run_id = %run.run_id, feature = %run.feature_id, step = %run.step, "workflow started");
        self.spawn_attempt(run.run_id, run.generation, request, cancel);
        Ok(run)
    }

    /// Cancel or retry a run
    ///
    /// # Errors
    /// - `NotFound` for an unknown run
    /// - `InvalidState` when the action is not valid in the run's status
    /// - `Conflict` when retrying while another run is active
    pub async fn control(
        &self,
        run_id: RunId,
        action: ControlAction,
        reason: Option<String>,
    ) -> SddResult<WorkflowRun> {
        match action {
            ControlAction::Cancel => self.cancel(run_id, reason),
            ControlAction::Retry => self.retry(run_id),
        }
    }

    fn cancel(&self, run_id: RunId, reason: Option<String>) -> SddResult<WorkflowRun> {
        let run = self.shared.workspace.write(|registry, ledger| {
            let state = registry
                .workflows
                .runs
                .get_mut(&run_id)
                .ok_or_else(|| not_found(run_id))?;
            state_machine::validate_transition(state.status, WorkflowStatus::Canceled)?;
            state.generation += 1;
            let message = reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CANCEL_MESSAGE.to_string());
            self.finish(
                registry,
                ledger,
                run_id,
                WorkflowStatus::Canceled,
                WorkflowEventKind::RunCanceled { message },
            )
        })?;
        tracing::info!(%run_id, "workflow canceled");
        Ok(run)
    }

    fn retry(&self, run_id: RunId) -> SddResult<WorkflowRun> {
        let (run, request, cancel) = self.shared.workspace.write(|registry, ledger| {
            let active = registry.workflows.active;
            let state = registry
                .workflows
                .runs
                .get_mut(&run_id)
                .ok_or_else(|| not_found(run_id))?;
            state_machine::validate_transition(state.status, WorkflowStatus::Running)?;
            if let Some(other) = active.filter(|a| *a != run_id) {
                return Err(SddError::Conflict(format!("workflow run {other} is already active")));
            }

            state.generation += 1;
            state.status = WorkflowStatus::Running;
            state.cancel = CancelToken::new();
            state.pending = None;
            state.executor_done = false;
            state.applying = false;
            let started = WorkflowEventKind::Started {
                feature_id: state.feature_id.clone(),
                goal: state.goal.clone(),
                step: state.step,
                connection_id: state.connection_id.clone(),
            };
            let out = (state.snapshot(), state.request(), state.cancel.clone());
            registry.workflows.active = Some(run_id);
            registry.workflows.finished.retain(|id| *id != run_id);
            self.emit(registry, ledger, run_id, started);
            Ok(out)
        })?;

        tracing::info!(%run_id, generation = run.generation, step = %run.step, "workflow retried");
        self.spawn_attempt(run_id, run.generation, request, cancel);
        Ok(run)
    }

    /// Apply a proposal to the run's pending change set
    ///
    /// Writes go in order and stop at the first failure; the rest are
    /// reported as not attempted. A failure fails the run.
    ///
    /// # Errors
    /// - `NotFound` for an unknown run
    /// - `InvalidState` if the run is not running, has no pending proposal,
    ///   or is already applying one
    pub async fn apply_proposal(&self, run_id: RunId, proposal: Proposal) -> SddResult<ApplyReport> {
        let (generation, cancel) = self.begin_apply(run_id, None)?;
        Ok(self.apply_writes(run_id, generation, cancel, proposal).await)
    }

    /// Run a test command on behalf of a running run
    ///
    /// A runner error is reported as exit code -1.
    ///
    /// # Errors
    /// `NotFound`, `InvalidState` if the run is not running, `Validation`
    /// for an empty command
    pub async fn run_tests(&self, run_id: RunId, command: &str) -> SddResult<TestOutcome> {
        if command.trim().is_empty() {
            return Err(SddError::Validation("test command must not be empty".to_string()));
        }
        let generation = self.shared.workspace.write(|registry, ledger| {
            let state = registry
                .workflows
                .runs
                .get(&run_id)
                .ok_or_else(|| not_found(run_id))?;
            require_running(state)?;
            let generation = state.generation;
            self.emit(
                registry,
                ledger,
                run_id,
                WorkflowEventKind::TestsRequested {
                    command: command.to_string(),
                },
            );
            Ok::<_, SddError>(generation)
        })?;

        let started = Instant::now();
        let (outcome, error) = match self.shared.tests.run(command).await {
            Ok(outcome) => (outcome, None),
            Err(e) => {
                tracing::warn!(%run_id, error = %e, "test runner failed");
                let outcome = TestOutcome {
                    exit_code: -1,
                    duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                };
                (outcome, Some(e.to_string()))
            }
        };

        self.emit_if_current(run_id, generation, |_| {
            Some(WorkflowEventKind::TestsCompleted {
                exit_code: outcome.exit_code,
                duration_ms: outcome.duration_ms,
                error,
            })
        });
        Ok(outcome)
    }

    /// Subscribe to one run's events, or to every run with `None`
    ///
    /// # Errors
    /// `NotFound` for a run this engine has never seen or has evicted; the
    /// ledger still holds its events (see [`Self::durable_history`])
    pub fn subscribe(&self, run_id: Option<RunId>) -> SddResult<Subscription> {
        if let Some(run_id) = run_id {
            let known = self
                .shared
                .workspace
                .read(|registry| registry.workflows.runs.contains_key(&run_id));
            if !known {
                return Err(not_found(run_id));
            }
        }
        Ok(self.shared.hub.subscribe(run_id))
    }

    /// Snapshot of a run
    ///
    /// # Errors
    /// `NotFound` for an unknown run
    pub fn run(&self, run_id: RunId) -> SddResult<WorkflowRun> {
        self.shared.workspace.read(|registry| {
            registry
                .workflows
                .runs
                .get(&run_id)
                .map(WorkflowRunState::snapshot)
                .ok_or_else(|| not_found(run_id))
        })
    }

    #[must_use]
    pub fn active_run(&self) -> Option<WorkflowRun> {
        self.shared.workspace.read(|registry| {
            let active = registry.workflows.active?;
            registry.workflows.runs.get(&active).map(WorkflowRunState::snapshot)
        })
    }

    /// Retained in-memory window for a run; empty once the run is evicted
    #[must_use]
    pub fn history(&self, run_id: RunId) -> Vec<WorkflowEvent> {
        self.shared.hub.history(run_id)
    }

    /// Full event history for a run, read back from the ledger
    #[must_use]
    pub fn durable_history(&self, run_id: RunId) -> Vec<WorkflowEvent> {
        let wanted = run_id.to_string();
        self.shared
            .workspace
            .snapshot()
            .iter()
            .filter(|e| e.kind == EventType::WorkflowEvent && e.metadata_str("runId") == Some(wanted.as_str()))
            .filter_map(|e| {
                let value = e.metadata.get("event")?.clone();
                serde_json::from_value(value)
                    .map_err(|err| tracing::debug!(version = e.version, error = %err, "skipping unreadable workflow event"))
                    .ok()
            })
            .collect()
    }

    fn spawn_attempt(&self, run_id: RunId, generation: u64, request: StepRequest, cancel: CancelToken) {
        let engine = self.clone();
        let mut outputs = self.shared.executor.run_step(request, cancel.clone());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!(%run_id, generation, "attempt cancelled");
                        return;
                    }
                    next = outputs.next() => match next {
                        Some(output) => {
                            if !engine.relay(run_id, generation, output).await {
                                return;
                            }
                        }
                        None => {
                            engine.executor_finished(run_id, generation);
                            return;
                        }
                    }
                }
            }
        });
    }

    /// Handle one executor output; `false` once the attempt is over
    async fn relay(&self, run_id: RunId, generation: u64, output: StepOutput) -> bool {
        match output {
            StepOutput::ContextLoaded { files } => {
                self.emit_if_current(run_id, generation, |_| Some(WorkflowEventKind::ContextLoaded { files }))
            }
            StepOutput::StepStarted { step } => self.emit_if_current(run_id, generation, |state| {
                state.step = step;
                Some(WorkflowEventKind::StepStarted { step })
            }),
            StepOutput::OutputAppended { text } => self.emit_if_current(run_id, generation, |state| {
                Some(WorkflowEventKind::OutputAppended { step: state.step, text })
            }),
            StepOutput::Proposal(proposal) => {
                let auto = self.shared.policy == ApplyPolicy::Auto;
                let for_apply = proposal.clone();
                let current = self.emit_if_current(run_id, generation, |state| {
                    state.pending = Some(proposal.clone());
                    Some(if auto {
                        WorkflowEventKind::ProposalReady { proposal }
                    } else {
                        WorkflowEventKind::ApprovalRequired { proposal }
                    })
                });
                if current && auto {
                    match self.begin_apply(run_id, Some(generation)) {
                        Ok((generation, cancel)) => {
                            self.apply_writes(run_id, generation, cancel, for_apply).await;
                        }
                        Err(e) => tracing::debug!(%run_id, error = %e, "auto-apply skipped"),
                    }
                }
                self.is_current(run_id, generation)
            }
            StepOutput::Failed { message } => {
                tracing::warn!(%run_id, %message, "executor failed");
                let failed = self.shared.workspace.write(|registry, ledger| {
                    let current = registry
                        .workflows
                        .runs
                        .get(&run_id)
                        .is_some_and(|s| s.is_current(generation));
                    if !current {
                        return Ok(());
                    }
                    self.finish(
                        registry,
                        ledger,
                        run_id,
                        WorkflowStatus::Failed,
                        WorkflowEventKind::RunFailed { message, results: None },
                    )
                    .map(|_| ())
                });
                if let Err(e) = failed {
                    tracing::error!(%run_id, error = %e, "could not fail workflow run");
                }
                false
            }
        }
    }

    fn executor_finished(&self, run_id: RunId, generation: u64) {
        let completed = self.shared.workspace.write(|registry, ledger| {
            let Some(state) = registry.workflows.runs.get_mut(&run_id) else {
                return false;
            };
            if !state.is_current(generation) {
                return false;
            }
            state.executor_done = true;
            if state.pending.is_some() || state.applying {
                tracing::debug!(%run_id, "executor done, waiting for proposal");
                return false;
            }
            let summary = state.last_summary.clone();
            self.finish(
                registry,
                ledger,
                run_id,
                WorkflowStatus::Completed,
                WorkflowEventKind::RunCompleted { summary },
            )
            .map_err(|e| tracing::error!(%run_id, error = %e, "could not complete workflow run"))
            .is_ok()
        });
        if completed {
            tracing::info!(%run_id, "workflow completed");
        }
    }

    /// Claim the pending proposal for application
    fn begin_apply(&self, run_id: RunId, generation: Option<u64>) -> SddResult<(u64, CancelToken)> {
        self.shared.workspace.write(|registry, _| {
            let state = registry
                .workflows
                .runs
                .get_mut(&run_id)
                .ok_or_else(|| not_found(run_id))?;
            require_running(state)?;
            if generation.is_some_and(|g| g != state.generation) {
                return Err(SddError::InvalidState("attempt was superseded".to_string()));
            }
            if state.pending.is_none() {
                return Err(SddError::InvalidState(format!("run {run_id} has no pending proposal")));
            }
            if state.applying {
                return Err(SddError::InvalidState(format!("run {run_id} is already applying a proposal")));
            }
            state.applying = true;
            Ok((state.generation, state.cancel.clone()))
        })
    }

    async fn apply_writes(
        &self,
        run_id: RunId,
        generation: u64,
        cancel: CancelToken,
        proposal: Proposal,
    ) -> ApplyReport {
        let mut results = Vec::with_capacity(proposal.writes.len());
        let mut stopped = false;
        for write in &proposal.writes {
            let status = if stopped || cancel.is_cancelled() {
                WriteStatus::NotAttempted
            } else {
                match self.shared.fs.write_file(&write.path, &write.content).await {
                    Ok(()) => WriteStatus::Succeeded,
                    Err(e) => {
                        stopped = true;
                        tracing::warn!(%run_id, path = %write.path, error = %e, "proposal write failed");
                        WriteStatus::Failed { error: e.to_string() }
                    }
                }
            };
            results.push(WriteResult {
                path: write.path.clone(),
                status,
            });
        }
        let report = ApplyReport { results };

        self.shared.workspace.write(|registry, ledger| {
            let Some(state) = registry.workflows.runs.get_mut(&run_id) else {
                return;
            };
            if state.generation == generation {
                state.applying = false;
            }
            if !state.is_current(generation) {
                tracing::debug!(%run_id, "apply finished after the attempt ended");
                return;
            }

            if let Some((path, error)) = report.first_error() {
                let message = format!("failed to write {path}: {error}");
                if let Err(e) = self.finish(
                    registry,
                    ledger,
                    run_id,
                    WorkflowStatus::Failed,
                    WorkflowEventKind::RunFailed {
                        message,
                        results: Some(report.results.clone()),
                    },
                ) {
                    tracing::error!(%run_id, error = %e, "could not fail workflow run");
                }
                return;
            }

            state.pending = None;
            state.last_summary = Some(proposal.summary.clone());
            let executor_done = state.executor_done;
            self.emit(
                registry,
                ledger,
                run_id,
                WorkflowEventKind::ProposalApplied {
                    summary: proposal.summary.clone(),
                    results: report.results.clone(),
                },
            );
            if executor_done {
                if let Err(e) = self.finish(
                    registry,
                    ledger,
                    run_id,
                    WorkflowStatus::Completed,
                    WorkflowEventKind::RunCompleted {
                        summary: Some(proposal.summary.clone()),
                    },
                ) {
                    tracing::error!(%run_id, error = %e, "could not complete workflow run");
                }
            }
        });
        report
    }

    fn is_current(&self, run_id: RunId, generation: u64) -> bool {
        self.shared.workspace.read(|registry| {
            registry
                .workflows
                .runs
                .get(&run_id)
                .is_some_and(|s| s.is_current(generation))
        })
    }

    /// Emit the event `build` returns while `generation` is current
    ///
    /// Returns whether the attempt is still current.
    fn emit_if_current(
        &self,
        run_id: RunId,
        generation: u64,
        build: impl FnOnce(&mut WorkflowRunState) -> Option<WorkflowEventKind>,
    ) -> bool {
        self.shared.workspace.write(|registry, ledger| {
            let Some(state) = registry.workflows.runs.get_mut(&run_id) else {
                return false;
            };
            if !state.is_current(generation) {
                tracing::debug!(%run_id, generation, "dropping output from superseded attempt");
                return false;
            }
            if let Some(kind) = build(state) {
                self.emit(registry, ledger, run_id, kind);
            }
            true
        })
    }

    /// Move a running run to a terminal status and emit its terminal event
    fn finish(
        &self,
        registry: &mut Registry,
        ledger: &LedgerStore,
        run_id: RunId,
        status: WorkflowStatus,
        kind: WorkflowEventKind,
    ) -> SddResult<WorkflowRun> {
        let state = registry
            .workflows
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| not_found(run_id))?;
        state_machine::validate_transition(state.status, status)?;
        state.status = status;
        state.pending = None;
        state.cancel.cancel();
        let run = state.snapshot();
        if registry.workflows.active == Some(run_id) {
            registry.workflows.active = None;
        }
        self.emit(registry, ledger, run_id, kind);
        self.retire(registry, run_id);
        Ok(run)
    }

    /// Queue a finished run for eviction, evicting beyond the retained count
    fn retire(&self, registry: &mut Registry, run_id: RunId) {
        let workflows = &mut registry.workflows;
        workflows.finished.push_back(run_id);
        while workflows.finished.len() > self.shared.retained_runs {
            let Some(oldest) = workflows.finished.pop_front() else {
                break;
            };
            workflows.runs.remove(&oldest);
            self.shared.hub.forget(oldest);
            tracing::debug!(run_id = %oldest, "evicted finished workflow run");
        }
    }

    /// Assign an id, persist and publish; caller holds the workspace lock
    fn emit(
        &self,
        registry: &mut Registry,
        ledger: &LedgerStore,
        run_id: RunId,
        kind: WorkflowEventKind,
    ) -> WorkflowEvent {
        registry.workflows.next_event_id += 1;
        let event = WorkflowEvent {
            id: registry.workflows.next_event_id,
            run_id,
            timestamp: Utc::now(),
            kind,
        };

        match serde_json::to_value(&event) {
            Ok(value) => {
                let draft = self
                    .shared
                    .workspace
                    .draft(EventType::WorkflowEvent)
                    .with_metadata("runId", run_id.to_string())
                    .with_metadata("event", value);
                if let Err(e) = ledger.append(draft) {
                    tracing::error!(%run_id, id = event.id, error = %e, "workflow event not persisted");
                }
            }
            Err(e) => tracing::error!(%run_id, id = event.id, error = %e, "workflow event not serializable"),
        }

        tracing::debug!(%run_id, id = event.id, kind = event.kind.name(), "workflow event");
        self.shared.hub.publish(&event);
        event
    }
}

fn require_running(state: &WorkflowRunState) -> SddResult<()> {
    if state.status != WorkflowStatus::Running {
        return Err(SddError::InvalidState(format!(
            "run {} is {:?}",
            state.run_id, state.status
        )));
    }
    Ok(())
}

fn not_found(run_id: RunId) -> SddError {
    SddError::NotFound(format!("workflow run {run_id}"))
}
