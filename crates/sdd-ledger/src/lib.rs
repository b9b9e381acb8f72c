//! SDD Ledger
//!
//! The single source of truth for spec-to-code traceability: an append-only,
//! versioned, hash-chained event log.
//!
//! # Core Concepts
//!
//! - [`LedgerStore`]: durable JSONL log with read-only safe mode on corruption
//! - [`NewEvent`] / [`LedgerEvent`]: draft and sealed events
//! - [`LedgerSnapshot`]: O(1) immutable view used by every reader
//! - [`ContentHash`]: 32-byte hash for documents, files and the chain
//!
//! # Example
//!
//! ```rust,ignore
//! use sdd_ledger::{EventType, FileOp, FileOpKind, LedgerStore, NewEvent};
//!
//! let store = LedgerStore::open(".sdd/ledger.jsonl")?;
//! store.append(
//!     NewEvent::new(EventType::UntrackedChangeDetected, "watcher")
//!         .with_file_op(FileOp::new("src/lib.rs", FileOpKind::Modify)),
//! )?;
//! let runs: Vec<_> = store.snapshot().query_by_file("src/lib.rs").iter().collect();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod error;
mod event;
mod hash;
mod query;
mod store;

pub use error::{Diagnostic, LedgerError};
pub use event::{
    DocRef, EventType, FileOp, FileOpKind, LedgerEvent, NewEvent, RunId, RunRef,
};
pub use hash::{ContentHash, HashError};
pub use query::{FileRuns, FileRunsIter, LedgerSnapshot, TaskTouches};
pub use store::{FileSink, LedgerSink, LedgerStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
