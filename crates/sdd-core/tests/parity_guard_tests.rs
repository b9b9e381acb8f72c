//! Parity, stale documents and commit gating

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sdd_core::prelude::*;
use sdd_core::{ApplyPolicy, Parity, SharedSettings};
use sdd_ledger::EventType;
use sdd_test_utils::{ScriptedExecutor, TestHarness};
use std::sync::Arc;

fn modify(path: &str) -> FileChange {
    FileChange::new(path, FileOpKind::Modify)
}

fn harness() -> TestHarness {
    let h = TestHarness::new(ScriptedExecutor::new(), ApplyPolicy::Manual);
    h.settings.set_block_commit(true);
    h
}

#[tokio::test]
async fn doc_edited_without_new_citation_is_stale() {
    let h = harness();
    h.fs.insert("specs/001/spec.md", "v1");
    h.fs.insert("specs/001/plan.md", "v1");
    h.service
        .start_run(
            "001",
            "T1",
            &["specs/001/spec.md".to_string(), "specs/001/plan.md".to_string()],
        )
        .await
        .unwrap();
    h.service.stop_run().unwrap();

    h.fs.insert("specs/001/spec.md", "v2");
    let parity = h.service.get_parity().await;
    assert_eq!(parity.stale_docs, vec!["specs/001/spec.md"]);

    h.fs.remove("specs/001/plan.md");
    let parity = h.service.get_parity().await;
    assert_eq!(parity.stale_docs, vec!["specs/001/plan.md", "specs/001/spec.md"]);
}

#[tokio::test]
async fn recitation_clears_staleness() {
    let h = harness();
    h.fs.insert("specs/001/spec.md", "v1");
    let inputs = ["specs/001/spec.md".to_string()];
    h.service.start_run("001", "T1", &inputs).await.unwrap();
    h.service.stop_run().unwrap();

    h.fs.insert("specs/001/spec.md", "v2");
    assert!(!h.service.get_parity().await.stale_docs.is_empty());

    h.service.start_run("001", "T2", &inputs).await.unwrap();
    assert!(h.service.get_parity().await.stale_docs.is_empty());
}

#[test]
fn commit_gating_with_override() {
    let h = harness();
    h.service.on_file_change(modify("src/a.rs")).unwrap();
    h.service.on_file_change(modify("src/b.rs")).unwrap();

    let blocked = h.service.check_commit().unwrap();
    assert!(!blocked.allowed);
    let both = vec!["src/a.rs".to_string(), "src/b.rs".to_string()];
    assert_eq!(blocked.untracked_files, Some(both.clone()));
    assert_eq!(blocked.drift_files, Some(both.clone()));

    assert_eq!(h.service.override_untracked("reviewed").unwrap(), both);
    let allowed = h.service.check_commit().unwrap();
    assert!(allowed.allowed);
    assert_eq!(allowed.reason.as_deref(), Some("override: reviewed"));

    // The successful commit opened a new window
    assert_eq!(h.service.override_untracked("again").unwrap(), Vec::<String>::new());
    h.service.on_file_change(modify("src/c.rs")).unwrap();
    let blocked_again = h.service.check_commit().unwrap();
    assert!(!blocked_again.allowed);
    assert_eq!(blocked_again.drift_files, Some(vec!["src/c.rs".to_string()]));
}

#[test]
fn new_untracked_file_after_override_blocks() {
    let h = harness();
    h.service.on_file_change(modify("src/a.rs")).unwrap();
    h.service.on_file_change(modify("src/b.rs")).unwrap();
    h.service.override_untracked("reviewed").unwrap();
    h.service.on_file_change(modify("src/c.rs")).unwrap();

    let decision = h.service.check_commit().unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.untracked_files.map(|f| f.len()), Some(3));
    assert_eq!(decision.drift_files, Some(vec!["src/c.rs".to_string()]));

    let kinds: Vec<_> = h.workspace.snapshot().iter().map(|e| e.kind).collect();
    assert_eq!(kinds.last(), Some(&EventType::CommitBlocked));
}

#[test]
fn retouching_an_overridden_file_invalidates_the_override() {
    let h = harness();
    h.service.on_file_change(modify("src/a.rs")).unwrap();
    h.service.override_untracked("reviewed").unwrap();
    h.service.on_file_change(modify("src/a.rs")).unwrap();

    let decision = h.service.check_commit().unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.drift_files, Some(vec!["src/a.rs".to_string()]));
}

#[tokio::test]
async fn spec_edit_after_override_does_not_block() {
    let h = harness();
    h.fs.insert("specs/001/spec.md", "v1");
    h.service
        .start_run("001", "T1", &["specs/001/spec.md".to_string()])
        .await
        .unwrap();
    h.service.stop_run().unwrap();
    h.service.on_file_change(modify("src/a.rs")).unwrap();
    h.service.override_untracked("reviewed").unwrap();
    h.service.on_file_change(modify("specs/001/spec.md")).unwrap();

    let decision = h.service.check_commit().unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.untracked_files, Some(vec!["src/a.rs".to_string()]));
}

#[test]
fn tracked_work_commits_cleanly() {
    let workspace = Arc::new(Workspace::in_memory());
    let coordinator = RunCoordinator::new(Arc::clone(&workspace));
    let guard = CommitGuard::new(Arc::clone(&workspace), Arc::new(SharedSettings::new(true)));

    coordinator.start_run("001", "T1", vec![]).unwrap();
    coordinator.on_file_change(modify("src/login.rs")).unwrap();
    coordinator.stop_run().unwrap();

    let decision = guard.check_commit().unwrap();
    assert!(decision.allowed);
    assert_eq!(ParityEngine::new(workspace).compute_from_ledger(), Parity::default());
}

proptest! {
    #[test]
    fn tracked_ratio_is_a_fraction(ops in proptest::collection::vec((any::<bool>(), 0u8..6), 0..40)) {
        let workspace = Arc::new(Workspace::in_memory());
        let coordinator = RunCoordinator::new(Arc::clone(&workspace));
        let parity = ParityEngine::new(Arc::clone(&workspace));

        for (tracked, file) in &ops {
            if *tracked && coordinator.active_run().is_none() {
                coordinator.start_run("001", "T1", vec![]).unwrap();
            }
            if !*tracked {
                coordinator.stop_run().unwrap();
            }
            coordinator.on_file_change(modify(&format!("src/{file}.rs"))).unwrap();
        }

        let result = parity.compute_from_ledger();
        prop_assert!((0.0..=1.0).contains(&result.tracked_ratio));
        prop_assert_eq!(
            result.tracked_file_changes + result.untracked_file_changes,
            ops.len() as u64
        );
        if ops.is_empty() {
            prop_assert_eq!(result.tracked_ratio, 1.0);
        }
    }
}
