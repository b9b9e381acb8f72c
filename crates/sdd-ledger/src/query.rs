//! Read-side views over an immutable ledger snapshot
//!
//! Snapshots are persistent vectors: taking one is O(1) and never blocks
//! writers for longer than a pointer copy.

use crate::event::{EventType, LedgerEvent, RunId, RunRef};
use im::Vector;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Point-in-time view of the ledger
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    events: Vector<Arc<LedgerEvent>>,
}

impl LedgerSnapshot {
    #[must_use]
    pub fn new(events: Vector<Arc<LedgerEvent>>) -> Self {
        Self { events }
    }

    /// Build a snapshot from already-sealed events (replay, tests)
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = LedgerEvent>) -> Self {
        Self {
            events: events.into_iter().map(Arc::new).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in version order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LedgerEvent> + '_ {
        self.events.iter().map(AsRef::as_ref)
    }

    /// Version of the newest event (0 when empty)
    #[must_use]
    pub fn last_version(&self) -> u64 {
        self.events.last().map_or(0, |e| e.version)
    }

    /// Events strictly after the most recent event of `kind`
    ///
    /// Returns the whole ledger when no such event exists.
    pub fn since_last(&self, kind: EventType) -> impl Iterator<Item = &LedgerEvent> + '_ {
        let start = self
            .events
            .iter()
            .rposition(|e| e.kind == kind)
            .map_or(0, |idx| idx + 1);
        self.events.iter().skip(start).map(AsRef::as_ref)
    }

    /// Lazy, restartable sequence of runs whose file ops touched `path`
    #[must_use]
    pub fn query_by_file(&self, path: impl Into<String>) -> FileRuns {
        FileRuns {
            snapshot: self.clone(),
            path: path.into(),
        }
    }

    /// Files touched while working on a feature task, and the runs involved
    #[must_use]
    pub fn query_by_feature_task(&self, feature_id: &str, task_id: &str) -> TaskTouches {
        let mut files = BTreeSet::new();
        let mut runs = Vec::new();
        let mut seen = HashSet::new();

        for event in self.iter() {
            let Some(run) = event
                .run
                .as_ref()
                .filter(|r| r.feature_id == feature_id && r.task_id == task_id)
            else {
                continue;
            };
            if seen.insert(run.run_id) {
                runs.push(run.clone());
            }
            if event.kind == EventType::FileChanged {
                files.extend(event.file_ops.iter().map(|op| op.path.clone()));
            }
        }

        TaskTouches {
            files: files.into_iter().collect(),
            runs,
        }
    }
}

/// Runs that touched one path; iterate as often as needed
#[derive(Debug, Clone)]
pub struct FileRuns {
    snapshot: LedgerSnapshot,
    path: String,
}

impl FileRuns {
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Start a fresh pass over the snapshot
    #[must_use]
    pub fn iter(&self) -> FileRunsIter<'_> {
        FileRunsIter {
            events: self.snapshot.events.iter(),
            path: &self.path,
            seen: HashSet::new(),
        }
    }
}

impl<'a> IntoIterator for &'a FileRuns {
    type Item = RunRef;
    type IntoIter = FileRunsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator yielding each touching run once, in order of first touch
pub struct FileRunsIter<'a> {
    events: im::vector::Iter<'a, Arc<LedgerEvent>>,
    path: &'a str,
    seen: HashSet<RunId>,
}

impl Iterator for FileRunsIter<'_> {
    type Item = RunRef;

    fn next(&mut self) -> Option<Self::Item> {
        for event in self.events.by_ref() {
            if event.kind != EventType::FileChanged || !event.touches(self.path) {
                continue;
            }
            if let Some(run) = &event.run {
                if self.seen.insert(run.run_id) {
                    return Some(run.clone());
                }
            }
        }
        None
    }
}

/// Result of [`LedgerSnapshot::query_by_feature_task`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTouches {
    /// Sorted, unique paths
    pub files: Vec<String>,
    /// Runs in order of first appearance
    pub runs: Vec<RunRef>,
}
