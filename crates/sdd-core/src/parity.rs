//! Parity Engine
//!
//! Derives the tracked/untracked picture of the current commit window from
//! the ledger. Nothing here mutates state except recording an override.

use crate::collab::FileSystem;
use crate::error::{SddError, SddResult};
use crate::types::{Parity, StatusChange};
use crate::workspace::Workspace;
use sdd_ledger::{ContentHash, EventType, FileOpKind, LedgerEvent, LedgerSnapshot};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::Arc;

/// Current content hash per document path; `None` means unreadable
pub type CurrentHashes = HashMap<String, Option<ContentHash>>;

#[derive(Debug, Clone, Copy)]
struct Citation {
    hash: ContentHash,
    version: u64,
}

/// Latest citation of every document ever used as a run input
fn citations<'a>(events: &[&'a LedgerEvent]) -> BTreeMap<&'a str, Citation> {
    let mut cited = BTreeMap::new();
    for event in events.iter().filter(|e| e.kind == EventType::RunStarted) {
        for doc in &event.docs {
            cited.insert(
                doc.path.as_str(),
                Citation {
                    hash: doc.hash,
                    version: event.version,
                },
            );
        }
    }
    cited
}

/// Paths ever cited as run inputs; file ops on them are documentation
pub(crate) fn cited_paths<'a>(events: &[&'a LedgerEvent]) -> BTreeSet<&'a str> {
    citations(events).into_keys().collect()
}

impl Parity {
    /// Compute parity from the full event sequence, oldest first
    ///
    /// The window is everything after the last `COMMIT_SUCCEEDED`. Paths
    /// missing from `current` fall back to the latest hash the ledger saw
    /// after the document was cited.
    #[must_use]
    pub fn from_events<'a>(
        events: impl IntoIterator<Item = &'a LedgerEvent>,
        current: &CurrentHashes,
    ) -> Self {
        let events: Vec<&LedgerEvent> = events.into_iter().collect();
        let cited = citations(&events);
        let window_start = events
            .iter()
            .rposition(|e| e.kind == EventType::CommitSucceeded)
            .map_or(0, |idx| idx + 1);

        let mut tracked = 0u64;
        let mut untracked = 0u64;
        let mut drift = BTreeSet::new();
        for event in &events[window_start..] {
            let is_tracked = match event.kind {
                EventType::FileChanged => true,
                EventType::UntrackedChangeDetected => false,
                _ => continue,
            };
            for op in event.file_ops.iter().filter(|op| !cited.contains_key(op.path.as_str())) {
                if is_tracked {
                    tracked += 1;
                } else {
                    untracked += 1;
                    drift.insert(op.path.clone());
                }
            }
        }

        let stale_docs = cited
            .iter()
            .filter(|(path, citation)| match current.get(**path) {
                Some(Some(hash)) => *hash != citation.hash,
                Some(None) => true,
                None => observed_stale(&events, path, **citation),
            })
            .map(|(path, _)| (*path).to_string())
            .collect();

        Self {
            tracked_file_changes: tracked,
            untracked_file_changes: untracked,
            tracked_ratio: Self::ratio(tracked, untracked),
            drift_files: drift.into_iter().collect(),
            stale_docs,
        }
    }
}

/// Whether the ledger saw the document change after it was cited
fn observed_stale(events: &[&LedgerEvent], path: &str, citation: Citation) -> bool {
    let latest = events
        .iter()
        .filter(|e| e.version > citation.version && e.kind.is_file_change())
        .flat_map(|e| e.file_ops.iter())
        .filter(|op| op.path == path)
        .last();
    match latest {
        Some(op) if op.op == FileOpKind::Delete => true,
        Some(op) => op.hash_after.is_some_and(|h| h != citation.hash),
        None => false,
    }
}

/// Computes parity on demand and records overrides
#[derive(Clone)]
pub struct ParityEngine {
    workspace: Arc<Workspace>,
    fs: Option<Arc<dyn FileSystem>>,
}

impl std::fmt::Debug for ParityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParityEngine")
            .field("reads_current_docs", &self.fs.is_some())
            .finish_non_exhaustive()
    }
}

impl ParityEngine {
    /// Engine that judges staleness from the ledger alone
    #[must_use]
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace, fs: None }
    }

    /// Read current document hashes through `fs` at query time
    #[must_use]
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Parity of the current window
    pub async fn compute(&self) -> Parity {
        let snapshot = self.workspace.snapshot();
        let current = match &self.fs {
            Some(fs) => current_hashes(fs.as_ref(), &snapshot).await,
            None => CurrentHashes::new(),
        };
        Parity::from_events(snapshot.iter(), &current)
    }

    /// Parity from ledger state alone
    #[must_use]
    pub fn compute_from_ledger(&self) -> Parity {
        Parity::from_events(self.workspace.snapshot().iter(), &CurrentHashes::new())
    }

    /// Record an override for the current untracked set
    ///
    /// Returns the paths the override covers.
    ///
    /// # Errors
    /// `Validation` for an empty reason, `Storage` on ledger failure
    pub fn override_untracked(&self, reason: &str) -> SddResult<Vec<String>> {
        if reason.trim().is_empty() {
            return Err(SddError::Validation("override reason must not be empty".to_string()));
        }

        let files = self.workspace.write(|_, ledger| {
            let files = Parity::from_events(ledger.snapshot().iter(), &CurrentHashes::new()).drift_files;
            ledger.append(
                self.workspace
                    .draft(EventType::CommitOverridden)
                    .with_metadata("reason", reason)
                    .with_metadata("files", files.clone()),
            )?;
            Ok::<_, SddError>(files)
        })?;

        tracing::warn!(%reason, files = files.len(), "untracked changes overridden");
        self.workspace.notify(StatusChange::OverrideRecorded {
            reason: reason.to_string(),
            files: files.clone(),
        });
        Ok(files)
    }
}

/// Hash every cited document as it is on disk right now
async fn current_hashes(fs: &dyn FileSystem, snapshot: &LedgerSnapshot) -> CurrentHashes {
    let paths: BTreeSet<&str> = snapshot
        .iter()
        .filter(|e| e.kind == EventType::RunStarted)
        .flat_map(|e| e.docs.iter().map(|d| d.path.as_str()))
        .collect();

    let mut current = CurrentHashes::with_capacity(paths.len());
    for path in paths {
        let hash = match fs.read_file(path).await {
            Ok(content) => Some(content.hash),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(%path, error = %e, "cannot read cited document");
                None
            }
        };
        current.insert(path.to_string(), hash);
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::FileChange;
    use crate::coordinator::RunCoordinator;
    use pretty_assertions::assert_eq;
    use sdd_ledger::DocRef;

    fn setup() -> (Arc<Workspace>, RunCoordinator, ParityEngine) {
        let workspace = Arc::new(Workspace::in_memory());
        let coordinator = RunCoordinator::new(Arc::clone(&workspace));
        let parity = ParityEngine::new(Arc::clone(&workspace));
        (workspace, coordinator, parity)
    }

    fn change(path: &str) -> FileChange {
        FileChange::new(path, FileOpKind::Modify)
    }

    #[test]
    fn empty_ledger_is_clean() {
        let (_, _, parity) = setup();
        let result = parity.compute_from_ledger();
        assert_eq!(result, Parity::default());
        assert!(result.is_clean());
    }

    #[test]
    fn counts_tracked_and_untracked() {
        let (_, coordinator, parity) = setup();
        coordinator.on_file_change(change("src/b.rs")).unwrap();
        coordinator.on_file_change(change("src/a.rs")).unwrap();
        coordinator.on_file_change(change("src/b.rs")).unwrap();
        coordinator.start_run("001", "T1", vec![]).unwrap();
        coordinator.on_file_change(change("src/c.rs")).unwrap();

        let result = parity.compute_from_ledger();
        assert_eq!(result.tracked_file_changes, 1);
        assert_eq!(result.untracked_file_changes, 3);
        assert_eq!(result.tracked_ratio, 0.25);
        assert_eq!(result.drift_files, vec!["src/a.rs", "src/b.rs"]);
    }

    #[test]
    fn cited_docs_are_not_counted() {
        let (_, coordinator, parity) = setup();
        let spec = "specs/001/spec.md";
        coordinator
            .start_run("001", "T1", vec![DocRef::new(spec, ContentHash::compute(b"v1"))])
            .unwrap();
        coordinator.stop_run().unwrap();
        coordinator.on_file_change(change(spec)).unwrap();

        let result = parity.compute_from_ledger();
        assert_eq!(result.untracked_file_changes, 0);
        assert!(result.drift_files.is_empty());
    }

    #[test]
    fn doc_edited_after_citation_is_stale() {
        let (_, coordinator, parity) = setup();
        let spec = "specs/001/spec.md";
        let h1 = ContentHash::compute(b"v1");
        let h2 = ContentHash::compute(b"v2");
        coordinator.start_run("001", "T1", vec![DocRef::new(spec, h1)]).unwrap();
        coordinator.stop_run().unwrap();
        coordinator
            .on_file_change(change(spec).with_hashes(Some(h1), Some(h2)))
            .unwrap();

        assert_eq!(parity.compute_from_ledger().stale_docs, vec![spec]);

        coordinator.start_run("001", "T2", vec![DocRef::new(spec, h2)]).unwrap();
        assert!(parity.compute_from_ledger().stale_docs.is_empty());
    }

    #[test]
    fn current_hashes_take_precedence() {
        let (workspace, coordinator, _) = setup();
        let h1 = ContentHash::compute(b"v1");
        coordinator
            .start_run(
                "001",
                "T1",
                vec![
                    DocRef::new("specs/001/spec.md", h1),
                    DocRef::new("specs/001/plan.md", h1),
                    DocRef::new("specs/001/tasks.md", h1),
                ],
            )
            .unwrap();

        let mut current = CurrentHashes::new();
        current.insert("specs/001/spec.md".into(), Some(h1));
        current.insert("specs/001/plan.md".into(), Some(ContentHash::compute(b"v2")));
        current.insert("specs/001/tasks.md".into(), None);

        let result = Parity::from_events(workspace.snapshot().iter(), &current);
        assert_eq!(result.stale_docs, vec!["specs/001/plan.md", "specs/001/tasks.md"]);
    }

    #[test]
    fn override_records_current_untracked_set() {
        let (workspace, coordinator, parity) = setup();
        coordinator.on_file_change(change("src/x.rs")).unwrap();

        assert!(matches!(parity.override_untracked(" "), Err(SddError::Validation(_))));
        let files = parity.override_untracked("hotfix reviewed").unwrap();
        assert_eq!(files, vec!["src/x.rs"]);

        let snapshot = workspace.snapshot();
        let last = snapshot.iter().last().unwrap();
        assert_eq!(last.kind, EventType::CommitOverridden);
        assert_eq!(last.metadata_strings("files"), vec!["src/x.rs"]);
    }
}
