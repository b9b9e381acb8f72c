//! Ledger event model
//!
//! A [`NewEvent`] is the draft a caller submits; the store validates it,
//! stamps version, timestamp and chain hashes, and returns the immutable
//! [`LedgerEvent`].

use crate::error::LedgerError;
use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Identifier for traceability runs and workflow runs (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Ledger event discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStarted,
    RunStopped,
    RunAborted,
    FileChanged,
    UntrackedChangeDetected,
    CommitBlocked,
    CommitSucceeded,
    CommitOverridden,
    WorkflowEvent,
}

impl EventType {
    /// Events that record file operations
    #[inline]
    #[must_use]
    pub fn is_file_change(self) -> bool {
        matches!(self, Self::FileChanged | Self::UntrackedChangeDetected)
    }

    /// Events that end a traceability run
    #[inline]
    #[must_use]
    pub fn ends_run(self) -> bool {
        matches!(self, Self::RunStopped | Self::RunAborted)
    }
}

/// Kind of file operation reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOpKind {
    Create,
    Modify,
    Delete,
    Rename,
}

impl FromStr for FileOpKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "modify" => Ok(Self::Modify),
            "delete" => Ok(Self::Delete),
            "rename" => Ok(Self::Rename),
            other => Err(LedgerError::Validation(format!("unknown file op: {other}"))),
        }
    }
}

/// A single file operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOp {
    pub path: String,
    pub op: FileOpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_before: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_after: Option<ContentHash>,
}

impl FileOp {
    #[must_use]
    pub fn new(path: impl Into<String>, op: FileOpKind) -> Self {
        Self {
            path: path.into(),
            op,
            hash_before: None,
            hash_after: None,
        }
    }

    #[must_use]
    pub fn with_hashes(mut self, before: Option<ContentHash>, after: Option<ContentHash>) -> Self {
        self.hash_before = before;
        self.hash_after = after;
        self
    }
}

/// Reference to a spec/plan/tasks document at a specific content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    pub path: String,
    pub hash: ContentHash,
}

impl DocRef {
    #[must_use]
    pub fn new(path: impl Into<String>, hash: ContentHash) -> Self {
        Self {
            path: path.into(),
            hash,
        }
    }
}

/// Reference from an event to the run it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRef {
    pub run_id: RunId,
    pub feature_id: String,
    pub task_id: String,
}

/// Draft event submitted to [`crate::LedgerStore::append`]
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub kind: EventType,
    pub actor: String,
    pub run: Option<RunRef>,
    pub docs: Vec<DocRef>,
    pub file_ops: Vec<FileOp>,
    pub metadata: BTreeMap<String, Value>,
}

impl NewEvent {
    /// Create a bare draft
    #[must_use]
    pub fn new(kind: EventType, actor: impl Into<String>) -> Self {
        Self {
            kind,
            actor: actor.into(),
            run: None,
            docs: Vec::new(),
            file_ops: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_run(mut self, run: RunRef) -> Self {
        self.run = Some(run);
        self
    }

    #[must_use]
    pub fn with_docs(mut self, docs: Vec<DocRef>) -> Self {
        self.docs = docs;
        self
    }

    #[must_use]
    pub fn with_file_op(mut self, op: FileOp) -> Self {
        self.file_ops.push(op);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check the draft's shape against its event type
    ///
    /// # Errors
    /// `LedgerError::Validation` describing the first violated rule
    pub fn validate(&self) -> Result<(), LedgerError> {
        let invalid = |msg: String| Err(LedgerError::Validation(msg));

        if self.actor.trim().is_empty() {
            return invalid("actor must not be empty".to_string());
        }
        if let Some(run) = &self.run {
            if run.feature_id.trim().is_empty() || run.task_id.trim().is_empty() {
                return invalid("run reference needs feature and task ids".to_string());
            }
        }
        if let Some(doc) = self.docs.iter().find(|d| d.path.trim().is_empty()) {
            return invalid(format!("doc reference with empty path (hash {})", doc.hash.short()));
        }
        if self.file_ops.iter().any(|op| op.path.trim().is_empty()) {
            return invalid("file op with empty path".to_string());
        }

        match self.kind {
            EventType::RunStarted | EventType::RunStopped | EventType::RunAborted => {
                if self.run.is_none() {
                    return invalid(format!("{:?} requires a run reference", self.kind));
                }
            }
            EventType::FileChanged => {
                if self.run.is_none() {
                    return invalid("FILE_CHANGED requires a run reference".to_string());
                }
                if self.file_ops.is_empty() {
                    return invalid("FILE_CHANGED requires at least one file op".to_string());
                }
            }
            EventType::UntrackedChangeDetected => {
                if self.run.is_some() {
                    return invalid("untracked change must not reference a run".to_string());
                }
                if self.file_ops.is_empty() {
                    return invalid("untracked change requires at least one file op".to_string());
                }
            }
            EventType::CommitOverridden => {
                let reason = self.metadata.get("reason").and_then(Value::as_str);
                if reason.map_or(true, |r| r.trim().is_empty()) {
                    return invalid("override requires a non-empty reason".to_string());
                }
            }
            EventType::CommitBlocked | EventType::CommitSucceeded => {}
            EventType::WorkflowEvent => {
                if !self.metadata.contains_key("event") {
                    return invalid("workflow event requires an `event` payload".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Immutable, versioned ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventType,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<DocRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_ops: Vec<FileOp>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    pub prev_hash: ContentHash,
    pub hash: ContentHash,
}

/// Fields covered by the chain hash, in a fixed order
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashBody<'a> {
    version: u64,
    timestamp: &'a DateTime<Utc>,
    kind: EventType,
    actor: &'a str,
    run: &'a Option<RunRef>,
    docs: &'a [DocRef],
    file_ops: &'a [FileOp],
    metadata: &'a BTreeMap<String, Value>,
    prev_hash: &'a ContentHash,
}

impl LedgerEvent {
    pub(crate) fn seal(
        draft: NewEvent,
        version: u64,
        timestamp: DateTime<Utc>,
        prev_hash: ContentHash,
    ) -> Self {
        let mut event = Self {
            version,
            timestamp,
            kind: draft.kind,
            actor: draft.actor,
            run: draft.run,
            docs: draft.docs,
            file_ops: draft.file_ops,
            metadata: draft.metadata,
            prev_hash,
            hash: ContentHash::zero(),
        };
        event.hash = event.compute_hash();
        event
    }

    /// Recompute the chain hash from the event's fields
    #[must_use]
    pub fn compute_hash(&self) -> ContentHash {
        let body = HashBody {
            version: self.version,
            timestamp: &self.timestamp,
            kind: self.kind,
            actor: &self.actor,
            run: &self.run,
            docs: &self.docs,
            file_ops: &self.file_ops,
            metadata: &self.metadata,
            prev_hash: &self.prev_hash,
        };
        // Serializing plain data with string keys cannot fail.
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        ContentHash::sha256([bytes.as_slice()])
    }

    /// Run id carried by this event, if any
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        self.run.as_ref().map(|r| r.run_id)
    }

    /// Whether any file op of this event touched `path`
    #[must_use]
    pub fn touches(&self, path: &str) -> bool {
        self.file_ops.iter().any(|op| op.path == path)
    }

    /// String metadata value
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// String-array metadata value (missing or malformed → empty)
    #[must_use]
    pub fn metadata_strings(&self, key: &str) -> Vec<String> {
        self.metadata
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
