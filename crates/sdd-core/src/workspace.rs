//! Per-workspace serialization point
//!
//! One mutex guards every ledger append together with the "active run" and
//! "active workflow run" registry, so the single-active invariants and the
//! ledger can never disagree. Readers take ledger snapshots and do not need
//! the lock. The lock is never held across an `.await`.

use crate::coordinator::replay_runs;
use crate::types::{Run, RunStatus, StatusChange, TaskPointer};
use crate::workflow::WorkflowRegistry;
use parking_lot::Mutex;
use sdd_ledger::{EventType, LedgerSnapshot, LedgerStore, NewEvent};
use std::sync::Arc;
use tokio::sync::broadcast;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Mutable state owned by the serialization point
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) active_run: Option<Run>,
    pub(crate) last_run: Option<Run>,
    pub(crate) current_task: Option<TaskPointer>,
    pub(crate) workflows: WorkflowRegistry,
}

/// Shared handle to one workspace's ledger and registry
#[derive(Debug)]
pub struct Workspace {
    ledger: Arc<LedgerStore>,
    registry: Mutex<Registry>,
    actor: String,
    status_tx: broadcast::Sender<StatusChange>,
}

impl Workspace {
    /// Wrap a ledger, recovering a run left active by a previous session
    #[must_use]
    pub fn new(ledger: Arc<LedgerStore>, actor: impl Into<String>) -> Self {
        let mut registry = Registry::default();
        let mut runs: Vec<Run> = replay_runs(&ledger.snapshot()).into_values().collect();
        runs.sort_by_key(|r| r.started_at);
        for run in runs {
            match run.status {
                RunStatus::Running => registry.active_run = Some(run),
                RunStatus::Stopped | RunStatus::Aborted => registry.last_run = Some(run),
            }
        }
        if let Some(run) = &registry.active_run {
            tracing::info!(run_id = %run.run_id, feature = %run.feature_id, task = %run.task_id, "recovered active run");
        }

        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            ledger,
            registry: Mutex::new(registry),
            actor: actor.into(),
            status_tx,
        }
    }

    /// In-memory workspace (tests, embedding)
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(LedgerStore::in_memory()), "user")
    }

    #[must_use]
    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Actor stamped on events this workspace records
    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    /// Run `f` with exclusive access to the registry and the ledger
    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut Registry, &LedgerStore) -> R) -> R {
        let mut registry = self.registry.lock();
        f(&mut registry, &self.ledger)
    }

    /// Read-only access to the registry
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.registry.lock())
    }

    /// Start a draft stamped with this workspace's actor
    pub(crate) fn draft(&self, kind: EventType) -> NewEvent {
        NewEvent::new(kind, self.actor.clone())
    }

    /// Publish a status change; nobody listening is fine
    pub(crate) fn notify(&self, change: StatusChange) {
        let _ = self.status_tx.send(change);
    }

    /// Receive status-changed notifications
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }
}
