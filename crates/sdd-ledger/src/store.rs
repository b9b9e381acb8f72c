//! Durable, append-only ledger store
//!
//! Events are kept as a hash chain in memory and mirrored to a JSONL file,
//! one event per line. Every append is flushed to disk before it is
//! acknowledged. A corrupt file or a failed write puts the store into a
//! read-only safe mode that only an operator can clear (by repairing the file
//! and reopening).

use crate::error::{Diagnostic, LedgerError};
use crate::event::{LedgerEvent, NewEvent};
use crate::hash::ContentHash;
use crate::query::LedgerSnapshot;
use chrono::Utc;
use im::Vector;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Durable destination for serialized ledger lines
pub trait LedgerSink: Send + fmt::Debug {
    /// Persist one newline-terminated line; must not return before the
    /// bytes are durable.
    fn write_line(&mut self, line: &[u8]) -> io::Result<()>;
}

/// Append-mode file sink with `fsync` per line
#[derive(Debug)]
pub struct FileSink {
    file: File,
}

impl FileSink {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl LedgerSink for FileSink {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.file.write_all(line)?;
        self.file.sync_data()
    }
}

#[derive(Debug)]
struct Inner {
    events: Vector<Arc<LedgerEvent>>,
    sink: Option<Box<dyn LedgerSink>>,
    safe_mode: Option<Diagnostic>,
}

/// Append-only, versioned event log
#[derive(Debug)]
pub struct LedgerStore {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
}

impl LedgerStore {
    /// Non-durable store (tests, embedding)
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: Vector::new(),
                sink: None,
                safe_mode: None,
            }),
            path: None,
        }
    }

    /// Store that persists through a caller-provided sink, starting empty
    #[must_use]
    pub fn with_sink(sink: Box<dyn LedgerSink>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: Vector::new(),
                sink: Some(sink),
                safe_mode: None,
            }),
            path: None,
        }
    }

    /// Open (or create) the JSONL ledger at `path`
    ///
    /// Corruption does not fail the open: the valid prefix stays readable and
    /// the store starts in safe mode.
    ///
    /// # Errors
    /// `LedgerError::Io` if the file or its directory cannot be accessed
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let (events, safe_mode) = if path.exists() {
            load(&fs::read(&path)?)
        } else {
            (Vector::new(), None)
        };

        match &safe_mode {
            Some(diag) => tracing::error!(
                path = %path.display(),
                valid_events = events.len(),
                %diag,
                "ledger corrupted, entering read-only safe mode"
            ),
            None => tracing::info!(path = %path.display(), events = events.len(), "ledger loaded"),
        }

        let sink = FileSink::open(&path)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                events,
                sink: Some(Box::new(sink)),
                safe_mode,
            }),
            path: Some(path),
        })
    }

    /// Validate, version, chain and persist an event
    ///
    /// # Errors
    /// - `Validation` for malformed drafts (nothing written)
    /// - `ReadOnly` while in safe mode
    /// - `Storage` if the durable write fails; the event is not recorded and
    ///   the store enters safe mode
    pub fn append(&self, draft: NewEvent) -> Result<Arc<LedgerEvent>, LedgerError> {
        draft.validate()?;

        let mut inner = self.inner.lock();
        if let Some(diag) = &inner.safe_mode {
            return Err(LedgerError::ReadOnly(diag.clone()));
        }

        let (version, prev_hash, last_ts) = match inner.events.last() {
            Some(last) => (last.version + 1, last.hash, Some(last.timestamp)),
            None => (1, ContentHash::zero(), None),
        };
        let now = Utc::now();
        let timestamp = last_ts.map_or(now, |last| last.max(now));
        let event = LedgerEvent::seal(draft, version, timestamp, prev_hash);

        if let Some(sink) = inner.sink.as_mut() {
            let mut line =
                serde_json::to_vec(&event).map_err(|e| LedgerError::Storage(e.to_string()))?;
            line.push(b'\n');
            if let Err(e) = sink.write_line(&line) {
                let diag = Diagnostic::new(None, format!("write of version {version} failed: {e}"));
                tracing::error!(version, error = %e, "ledger write failed, entering safe mode");
                inner.safe_mode = Some(diag);
                return Err(LedgerError::Storage(e.to_string()));
            }
        }

        let event = Arc::new(event);
        inner.events.push_back(Arc::clone(&event));
        tracing::debug!(version, kind = ?event.kind, "ledger event appended");
        Ok(event)
    }

    /// Immutable view of every event appended so far
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(self.inner.lock().events.clone())
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Diagnostic if the store is in safe mode
    #[must_use]
    pub fn safe_mode(&self) -> Option<Diagnostic> {
        self.inner.lock().safe_mode.clone()
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.lock().safe_mode.is_some()
    }

    /// Backing file, if durable
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-walk the in-memory hash chain
    ///
    /// # Errors
    /// `IntegrityViolation` naming the first bad version
    pub fn verify_integrity(&self) -> Result<(), LedgerError> {
        let inner = self.inner.lock();
        let mut prev = ContentHash::zero();
        for (idx, event) in inner.events.iter().enumerate() {
            let expected_version = idx as u64 + 1;
            if event.version != expected_version
                || event.prev_hash != prev
                || event.hash != event.compute_hash()
            {
                return Err(LedgerError::IntegrityViolation {
                    version: event.version,
                });
            }
            prev = event.hash;
        }
        Ok(())
    }
}

/// Parse and verify a ledger file, stopping at the first bad line
fn load(bytes: &[u8]) -> (Vector<Arc<LedgerEvent>>, Option<Diagnostic>) {
    let mut events: Vector<Arc<LedgerEvent>> = Vector::new();
    let mut prev = ContentHash::zero();
    let torn_tail = !bytes.is_empty() && !bytes.ends_with(b"\n");
    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last_idx = lines.len().saturating_sub(1);

    for (idx, line) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        if torn_tail && idx == last_idx {
            return (events, Some(Diagnostic::new(Some(line_no), "truncated trailing entry")));
        }

        let event: LedgerEvent = match serde_json::from_slice(line) {
            Ok(event) => event,
            Err(e) => {
                return (events, Some(Diagnostic::new(Some(line_no), format!("unparsable entry: {e}"))));
            }
        };

        let expected_version = events.len() as u64 + 1;
        let problem = if event.version != expected_version {
            Some(format!(
                "version {} where {expected_version} was expected",
                event.version
            ))
        } else if event.prev_hash != prev {
            Some(format!("broken chain at version {}", event.version))
        } else if event.hash != event.compute_hash() {
            Some(format!("hash mismatch at version {}", event.version))
        } else {
            None
        };
        if let Some(reason) = problem {
            return (events, Some(Diagnostic::new(Some(line_no), reason)));
        }

        prev = event.hash;
        events.push_back(Arc::new(event));
    }
    (events, None)
}
