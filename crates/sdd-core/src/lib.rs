//! SDD Core - spec-driven-development traceability
//!
//! Ties code changes back to the spec, plan and task documents that asked
//! for them:
//! - Tracks one active run per workspace and tags file changes to it
//! - Computes parity (tracked vs untracked changes, stale documents)
//! - Gates commits on untracked changes, with recorded overrides
//! - Answers file and task trace queries from the ledger
//! - Drives feature workflows through an external step executor
//!
//! # Example
//!
//! ```rust,ignore
//! use sdd_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let workspace = Arc::new(Workspace::in_memory());
//! let coordinator = RunCoordinator::new(Arc::clone(&workspace));
//! let parity = ParityEngine::new(Arc::clone(&workspace));
//!
//! coordinator.start_run("001-login", "T3", vec![])?;
//! coordinator.on_file_change(FileChange::new("src/login.rs", FileOpKind::Modify))?;
//! coordinator.stop_run()?;
//!
//! assert_eq!(parity.compute().await.tracked_ratio, 1.0);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod collab;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod features;
pub mod guard;
pub mod parity;
pub mod service;
pub mod trace;
pub mod types;
pub mod workflow;
pub mod workspace;

// Re-exports for convenience
pub use collab::{
    FileChange, FileContent, FileSystem, LocalFileSystem, ProcessTestRunner, StepExecutor,
    StepOutput, StepRequest, TestOutcome, TestRunner,
};
pub use config::{ApplyPolicy, SddConfig, Settings, SharedSettings, WorkflowConfig, CONFIG_FILE};
pub use coordinator::{replay_runs, RunCoordinator};
pub use error::{SddError, SddResult};
pub use features::{DirectoryFeatureCatalog, FeatureCatalog};
pub use guard::CommitGuard;
pub use parity::{CurrentHashes, ParityEngine};
pub use service::{Collaborators, SddService};
pub use trace::TraceQueryService;
pub use types::{
    CommitDecision, Feature, FileTrace, Parity, Run, RunStatus, Status, StatusChange, TaskPointer,
    TaskTrace,
};
pub use workflow::{
    ApplyReport, CancelToken, ControlAction, FileWrite, Proposal, ProposalSummary, Step,
    Subscription, WorkflowEngine, WorkflowEvent, WorkflowEventKind, WorkflowRun, WorkflowStatus,
    WriteResult, WriteStatus,
};
pub use workspace::Workspace;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with SDD Core
    pub use crate::{
        CommitGuard, FileChange, ParityEngine, RunCoordinator, SddError, SddResult, SddService,
        TraceQueryService, WorkflowEngine, Workspace,
    };
    pub use sdd_ledger::{ContentHash, DocRef, FileOpKind, RunId};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
