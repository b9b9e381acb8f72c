//! Commit Guard
//!
//! Decides whether a commit may proceed given the current window's
//! untracked changes, the blocking policy and any recorded override. The
//! decision and its ledger entry are made under the workspace lock.

use crate::config::Settings;
use crate::error::{SddError, SddResult};
use crate::parity::{cited_paths, CurrentHashes};
use crate::types::{CommitDecision, Parity, StatusChange};
use crate::workspace::Workspace;
use sdd_ledger::{EventType, LedgerEvent, LedgerSnapshot};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Gates commits on untracked code changes
#[derive(Clone)]
pub struct CommitGuard {
    workspace: Arc<Workspace>,
    settings: Arc<dyn Settings>,
}

impl std::fmt::Debug for CommitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitGuard")
            .field("blocking", &self.settings.block_commit_on_untracked_code_changes())
            .finish_non_exhaustive()
    }
}

impl CommitGuard {
    #[must_use]
    pub fn new(workspace: Arc<Workspace>, settings: Arc<dyn Settings>) -> Self {
        Self { workspace, settings }
    }

    /// Check a commit attempt and record the outcome
    ///
    /// An allowed commit appends `COMMIT_SUCCEEDED`, which opens a new
    /// parity window; a blocked one appends `COMMIT_BLOCKED`.
    ///
    /// # Errors
    /// `Storage` if the outcome cannot be recorded
    pub fn check_commit(&self) -> SddResult<CommitDecision> {
        let blocking = self.settings.block_commit_on_untracked_code_changes();

        let decision = self.workspace.write(|_, ledger| {
            let decision = decide(&ledger.snapshot(), blocking);
            let draft = if decision.allowed {
                let mut draft = self.workspace.draft(EventType::CommitSucceeded);
                if let Some(reason) = &decision.reason {
                    draft = draft.with_metadata("reason", reason.as_str());
                }
                draft
            } else {
                self.workspace
                    .draft(EventType::CommitBlocked)
                    .with_metadata("untrackedFiles", decision.untracked_files.clone().unwrap_or_default())
                    .with_metadata("driftFiles", decision.drift_files.clone().unwrap_or_default())
            };
            ledger.append(draft)?;
            Ok::<_, SddError>(decision)
        })?;

        if decision.allowed {
            tracing::info!(reason = decision.reason.as_deref().unwrap_or("clean"), "commit allowed");
        } else {
            tracing::warn!(
                drift = ?decision.drift_files.as_deref().unwrap_or_default(),
                "commit blocked by untracked changes"
            );
        }
        self.workspace.notify(StatusChange::CommitChecked {
            decision: decision.clone(),
        });
        Ok(decision)
    }
}

/// Pure decision over a ledger snapshot
///
/// An override covers the block only while no untracked code change has
/// been recorded after it and every untracked path is in its file set.
/// When blocked, `drift_files` lists the uncovered paths plus any path
/// touched after the override.
#[must_use]
pub fn decide(snapshot: &LedgerSnapshot, blocking: bool) -> CommitDecision {
    let events: Vec<&LedgerEvent> = snapshot.iter().collect();
    let untracked = Parity::from_events(events.iter().copied(), &CurrentHashes::new()).drift_files;

    if !blocking || untracked.is_empty() {
        return CommitDecision {
            allowed: true,
            reason: None,
            untracked_files: None,
            drift_files: None,
        };
    }

    let cited = cited_paths(&events);
    let window: Vec<&LedgerEvent> = snapshot.since_last(EventType::CommitSucceeded).collect();
    let last_override = window
        .iter()
        .rposition(|e| e.kind == EventType::CommitOverridden);

    let covered: BTreeSet<String> = last_override
        .map(|idx| window[idx].metadata_strings("files").into_iter().collect())
        .unwrap_or_default();
    let touched_after: BTreeSet<&str> = last_override
        .map(|idx| {
            window[idx + 1..]
                .iter()
                .filter(|e| e.kind == EventType::UntrackedChangeDetected)
                .flat_map(|e| e.file_ops.iter())
                .map(|op| op.path.as_str())
                .filter(|path| !cited.contains(path))
                .collect()
        })
        .unwrap_or_default();
    let drift: Vec<String> = untracked
        .iter()
        .filter(|path| !covered.contains(*path) || touched_after.contains(path.as_str()))
        .cloned()
        .collect();

    if let Some(idx) = last_override.filter(|_| drift.is_empty()) {
        let reason = window[idx].metadata_str("reason").unwrap_or_default();
        return CommitDecision {
            allowed: true,
            reason: Some(format!("override: {reason}")),
            untracked_files: Some(untracked),
            drift_files: None,
        };
    }

    CommitDecision {
        allowed: false,
        reason: Some("untracked code changes".to_string()),
        untracked_files: Some(untracked),
        drift_files: Some(drift),
    }
}
