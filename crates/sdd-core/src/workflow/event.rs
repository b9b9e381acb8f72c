//! Workflow stream events and proposal payloads

use chrono::{DateTime, Utc};
use sdd_ledger::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered workflow steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Spec,
    Plan,
    Tasks,
    Implement,
    Review,
}

impl Step {
    pub const ALL: [Step; 5] = [Step::Spec, Step::Plan, Step::Tasks, Step::Implement, Step::Review];

    /// Following step, `None` after review
    #[must_use]
    pub fn next(self) -> Option<Step> {
        match self {
            Step::Spec => Some(Step::Plan),
            Step::Plan => Some(Step::Tasks),
            Step::Tasks => Some(Step::Implement),
            Step::Implement => Some(Step::Review),
            Step::Review => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Spec => "spec",
            Step::Plan => "plan",
            Step::Tasks => "tasks",
            Step::Implement => "implement",
            Step::Review => "review",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl WorkflowStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }
}

/// One file write inside a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

impl FileWrite {
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSummary {
    pub files_changed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u64>,
}

/// Candidate change set awaiting approval or application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub writes: Vec<FileWrite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    pub summary: ProposalSummary,
}

impl Proposal {
    /// Proposal whose summary counts the written files
    #[must_use]
    pub fn from_writes(writes: Vec<FileWrite>) -> Self {
        let summary = ProposalSummary {
            files_changed: writes.len(),
            additions: None,
            deletions: None,
        };
        Self {
            writes,
            patch: None,
            summary,
        }
    }
}

/// Outcome of one write during proposal application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WriteStatus {
    Succeeded,
    Failed { error: String },
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub path: String,
    #[serde(flatten)]
    pub status: WriteStatus,
}

/// Per-path report of a proposal application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub results: Vec<WriteResult>,
}

impl ApplyReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.status == WriteStatus::Succeeded)
    }

    /// First failure, if any
    #[must_use]
    pub fn first_error(&self) -> Option<(&str, &str)> {
        self.results.iter().find_map(|r| match &r.status {
            WriteStatus::Failed { error } => Some((r.path.as_str(), error.as_str())),
            _ => None,
        })
    }
}

/// Event payloads streamed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkflowEventKind {
    Started {
        feature_id: String,
        goal: String,
        step: Step,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection_id: Option<String>,
    },
    ContextLoaded {
        files: Vec<String>,
    },
    StepStarted {
        step: Step,
    },
    OutputAppended {
        step: Step,
        text: String,
    },
    ProposalReady {
        proposal: Proposal,
    },
    ApprovalRequired {
        proposal: Proposal,
    },
    ProposalApplied {
        summary: ProposalSummary,
        results: Vec<WriteResult>,
    },
    TestsRequested {
        command: String,
    },
    TestsCompleted {
        exit_code: i32,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    RunCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<ProposalSummary>,
    },
    RunFailed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        results: Option<Vec<WriteResult>>,
    },
    RunCanceled {
        message: String,
    },
    /// A `type` this build does not know; consumers log and skip it
    #[serde(other)]
    Unknown,
}

impl WorkflowEventKind {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. } | Self::RunFailed { .. } | Self::RunCanceled { .. }
        )
    }

    /// Wire name of the variant
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::ContextLoaded { .. } => "contextLoaded",
            Self::StepStarted { .. } => "stepStarted",
            Self::OutputAppended { .. } => "outputAppended",
            Self::ProposalReady { .. } => "proposalReady",
            Self::ApprovalRequired { .. } => "approvalRequired",
            Self::ProposalApplied { .. } => "proposalApplied",
            Self::TestsRequested { .. } => "testsRequested",
            Self::TestsCompleted { .. } => "testsCompleted",
            Self::RunCompleted { .. } => "runCompleted",
            Self::RunFailed { .. } => "runFailed",
            Self::RunCanceled { .. } => "runCanceled",
            Self::Unknown => "unknown",
        }
    }
}

/// A workflow event as delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Monotonic across the workspace
    pub id: u64,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: WorkflowEventKind,
}

impl WorkflowEvent {
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
