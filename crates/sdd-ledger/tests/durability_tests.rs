//! Durable ledger tests
//!
//! Reopen, corruption detection and safe mode against real files.

use pretty_assertions::assert_eq;
use sdd_ledger::{
    ContentHash, DocRef, EventType, FileOp, FileOpKind, LedgerError, LedgerStore, NewEvent, RunId,
    RunRef,
};
use std::fs;
use tempfile::TempDir;

fn run_ref() -> RunRef {
    RunRef {
        run_id: RunId::new(),
        feature_id: "002-billing".to_string(),
        task_id: "T004".to_string(),
    }
}

fn seed(store: &LedgerStore) -> RunRef {
    let run = run_ref();
    store
        .append(
            NewEvent::new(EventType::RunStarted, "user")
                .with_run(run.clone())
                .with_docs(vec![DocRef::new(
                    "specs/002-billing/spec.md",
                    ContentHash::compute(b"spec v1"),
                )]),
        )
        .unwrap();
    store
        .append(
            NewEvent::new(EventType::FileChanged, "user")
                .with_run(run.clone())
                .with_file_op(
                    FileOp::new("src/billing.rs", FileOpKind::Modify)
                        .with_hashes(Some(ContentHash::compute(b"old")), Some(ContentHash::compute(b"new"))),
                ),
        )
        .unwrap();
    store
        .append(NewEvent::new(EventType::RunStopped, "user").with_run(run.clone()))
        .unwrap();
    run
}

#[test]
fn reopen_restores_events_and_continues_versions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".sdd/ledger.jsonl");

    let run = {
        let store = LedgerStore::open(&path).unwrap();
        seed(&store)
    };

    let store = LedgerStore::open(&path).unwrap();
    assert_eq!(store.len(), 3);
    assert!(store.safe_mode().is_none());
    assert!(store.verify_integrity().is_ok());

    let next = store
        .append(NewEvent::new(EventType::CommitSucceeded, "user"))
        .unwrap();
    assert_eq!(next.version, 4);

    let runs: Vec<_> = store.snapshot().query_by_file("src/billing.rs").iter().collect();
    assert_eq!(runs, vec![run]);
}

#[test]
fn tampered_line_enters_safe_mode_with_prefix_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.jsonl");
    {
        let store = LedgerStore::open(&path).unwrap();
        seed(&store);
    }

    let text = fs::read_to_string(&path).unwrap();
    let tampered = text.replacen("src/billing.rs", "src/evil.rs", 1);
    fs::write(&path, tampered).unwrap();

    let store = LedgerStore::open(&path).unwrap();
    let diag = store.safe_mode().expect("corruption should be diagnosed");
    assert_eq!(diag.line, Some(2));
    assert_eq!(store.len(), 1);

    let err = store
        .append(NewEvent::new(EventType::CommitSucceeded, "user"))
        .unwrap_err();
    assert!(matches!(err, LedgerError::ReadOnly(_)));
    assert!(err.is_fatal());
}

#[test]
fn garbage_line_is_diagnosed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.jsonl");
    fs::write(&path, "not json at all\n").unwrap();

    let store = LedgerStore::open(&path).unwrap();
    assert!(store.is_read_only());
    assert!(store.is_empty());
}

#[test]
fn missing_file_starts_empty_and_writable() {
    let dir = TempDir::new().unwrap();
    let store = LedgerStore::open(dir.path().join("nested/dir/ledger.jsonl")).unwrap();
    assert!(store.is_empty());
    assert!(!store.is_read_only());
    assert!(store.path().is_some());
}
