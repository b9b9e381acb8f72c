//! Workflow engine behaviour against scripted collaborators

use futures::StreamExt;
use pretty_assertions::assert_eq;
use sdd_core::{
    ApplyPolicy, ControlAction, SddConfig, SddError, Step, Subscription, WorkflowEvent,
    WorkflowEventKind, WorkflowStatus, WriteStatus,
};
use sdd_test_utils::{
    fail, propose, proposal, say, sleep_ms, step, FakeTestRunner, ScriptItem, ScriptedExecutor,
    TestHarness,
};
use std::io;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

async fn until_end(sub: Subscription) -> Vec<WorkflowEvent> {
    tokio::time::timeout(TIMEOUT, sub.into_stream().collect())
        .await
        .expect("run did not reach a terminal event")
}

async fn until(sub: &Subscription, name: &str) -> WorkflowEvent {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let event = sub.recv().await.expect("subscription ended early");
            if event.kind.name() == name {
                return event;
            }
        }
    })
    .await
    .expect("event never arrived")
}

fn names(events: &[WorkflowEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind.name()).collect()
}

fn terminal_count(events: &[WorkflowEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

#[tokio::test]
async fn cancel_right_after_start_yields_one_cancel() {
    let executor = ScriptedExecutor::new()
        .then(vec![sleep_ms(20), say("late output"), sleep_ms(20), say("later")])
        .ignoring_cancel();
    let h = TestHarness::new(executor, ApplyPolicy::Manual);

    let run = h.service.start_workflow("001", "add login", None, None).await.unwrap();
    let canceled = h
        .service
        .control(run.run_id, ControlAction::Cancel, None)
        .await
        .unwrap();
    assert_eq!(canceled.status, WorkflowStatus::Canceled);

    tokio::time::sleep(Duration::from_millis(80)).await;

    let events = until_end(h.service.subscribe_workflow(Some(run.run_id)).unwrap()).await;
    assert_eq!(names(&events), vec!["started", "runCanceled"]);
    assert_eq!(
        events[1].kind,
        WorkflowEventKind::RunCanceled {
            message: "canceled by user".into()
        }
    );

    let durable = h.service.workflow().durable_history(run.run_id);
    assert_eq!(durable, events);

    let again = h.service.control(run.run_id, ControlAction::Cancel, None).await;
    assert!(matches!(again, Err(SddError::InvalidState(_))));
}

#[tokio::test]
async fn partial_write_failure_fails_the_run() {
    let executor = ScriptedExecutor::new().then(vec![
        step(Step::Implement),
        propose(&[("src/a.rs", "a"), ("src/b.rs", "b"), ("src/c.rs", "c")]),
    ]);
    let h = TestHarness::new(executor, ApplyPolicy::Manual);
    h.fs.fail_writes_to("src/b.rs", io::ErrorKind::PermissionDenied);

    let run = h.service.start_workflow("001", "implement", None, None).await.unwrap();
    let sub = h.service.subscribe_workflow(Some(run.run_id)).unwrap();
    let pending = match until(&sub, "approvalRequired").await.kind {
        WorkflowEventKind::ApprovalRequired { proposal } => proposal,
        other => panic!("unexpected event {other:?}"),
    };

    let report = h.service.apply_proposal(run.run_id, pending).await.unwrap();
    let statuses: Vec<_> = report.results.iter().map(|r| r.status.clone()).collect();
    assert!(matches!(statuses[0], WriteStatus::Succeeded));
    assert!(matches!(statuses[1], WriteStatus::Failed { .. }));
    assert!(matches!(statuses[2], WriteStatus::NotAttempted));
    assert_eq!(h.fs.write_attempts(), vec!["src/a.rs", "src/b.rs"]);
    assert_eq!(h.fs.contents("src/a.rs").as_deref(), Some("a"));

    let failed = until(&sub, "runFailed").await;
    match failed.kind {
        WorkflowEventKind::RunFailed { results, .. } => assert_eq!(results, Some(report.results)),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.service.workflow().run(run.run_id).unwrap().status, WorkflowStatus::Failed);
    assert!(sub.recv().await.is_none());
}

#[tokio::test]
async fn auto_policy_applies_and_completes() {
    let executor = ScriptedExecutor::new().then(vec![
        step(Step::Spec),
        say("drafting spec"),
        propose(&[("specs/001/spec.md", "# Login")]),
    ]);
    let h = TestHarness::new(executor, ApplyPolicy::Auto);

    let run = h.service.start_workflow("001", "login", None, Some("conn-1".into())).await.unwrap();
    let events = until_end(h.service.subscribe_workflow(Some(run.run_id)).unwrap()).await;

    assert_eq!(
        names(&events),
        vec!["started", "stepStarted", "outputAppended", "proposalReady", "proposalApplied", "runCompleted"]
    );
    assert_eq!(
        events[2].kind,
        WorkflowEventKind::OutputAppended {
            step: Step::Spec,
            text: "drafting spec".into()
        }
    );
    assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(h.fs.contents("specs/001/spec.md").as_deref(), Some("# Login"));
    assert!(h.service.workflow().active_run().is_none());
}

#[tokio::test]
async fn manual_proposal_holds_completion_until_applied() {
    let executor = ScriptedExecutor::new().then(vec![propose(&[("specs/001/plan.md", "# Plan")])]);
    let h = TestHarness::new(executor, ApplyPolicy::Manual);

    let run = h.service.start_workflow("001", "plan", Some(Step::Plan), None).await.unwrap();
    let sub = h.service.subscribe_workflow(Some(run.run_id)).unwrap();
    until(&sub, "approvalRequired").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let waiting = h.service.workflow().run(run.run_id).unwrap();
    assert_eq!(waiting.status, WorkflowStatus::Running);
    assert!(waiting.pending_proposal.is_some());

    let report = h
        .service
        .apply_proposal(run.run_id, proposal(&[("specs/001/plan.md", "# Plan")]))
        .await
        .unwrap();
    assert!(report.is_success());

    assert_eq!(until(&sub, "proposalApplied").await.run_id, run.run_id);
    assert!(matches!(
        until(&sub, "runCompleted").await.kind,
        WorkflowEventKind::RunCompleted { summary: Some(_) }
    ));

    let late = h.service.apply_proposal(run.run_id, proposal(&[])).await;
    assert!(matches!(late, Err(SddError::InvalidState(_))));
}

#[tokio::test]
async fn retry_restarts_the_failed_step() {
    let executor = ScriptedExecutor::new()
        .then(vec![step(Step::Plan), say("thinking"), fail("model unavailable")])
        .then(vec![say("second try")]);
    let h = TestHarness::new(executor, ApplyPolicy::Manual);

    let run = h.service.start_workflow("001", "plan it", None, None).await.unwrap();
    let first = until_end(h.service.subscribe_workflow(Some(run.run_id)).unwrap()).await;
    assert_eq!(first.last().map(|e| e.kind.name()), Some("runFailed"));
    assert_eq!(terminal_count(&first), 1);

    let retried = h.service.control(run.run_id, ControlAction::Retry, None).await.unwrap();
    assert_eq!(retried.status, WorkflowStatus::Running);
    assert_eq!(retried.step, Step::Plan);
    assert_eq!(retried.generation, run.generation + 1);

    let sub = h.service.subscribe_workflow(Some(run.run_id)).unwrap();
    until(&sub, "runCompleted").await;
    let requests = h.executor.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].step, Step::Plan);

    let all = h.service.workflow().history(run.run_id);
    assert_eq!(terminal_count(&all), 2);
    assert_eq!(names(&all).iter().filter(|n| **n == "started").count(), 2);
}

#[tokio::test]
async fn one_active_workflow_at_a_time() {
    let executor = ScriptedExecutor::new().then(vec![ScriptItem::Hang]);
    let h = TestHarness::new(executor, ApplyPolicy::Manual);

    let run = h.service.start_workflow("001", "first", None, None).await.unwrap();
    let second = h.service.start_workflow("002", "second", None, None).await;
    assert!(matches!(second, Err(SddError::Conflict(_))));

    let retry_running = h.service.control(run.run_id, ControlAction::Retry, None).await;
    assert!(matches!(retry_running, Err(SddError::InvalidState(_))));

    let unknown = h
        .service
        .control(sdd_ledger::RunId::new(), ControlAction::Cancel, None)
        .await;
    assert!(matches!(unknown, Err(SddError::NotFound(_))));
    assert!(h.service.subscribe_workflow(Some(sdd_ledger::RunId::new())).is_err());

    let no_proposal = h.service.apply_proposal(run.run_id, proposal(&[])).await;
    assert!(matches!(no_proposal, Err(SddError::InvalidState(_))));

    h.service
        .control(run.run_id, ControlAction::Cancel, Some("switching task".into()))
        .await
        .unwrap();
    assert!(h.service.start_workflow("002", "second", None, None).await.is_ok());
}

#[tokio::test]
async fn tests_are_requested_and_reported() {
    let executor = ScriptedExecutor::new().then(vec![ScriptItem::Hang]);
    let h = TestHarness::new(executor, ApplyPolicy::Manual);
    let run = h.service.start_workflow("001", "verify", None, None).await.unwrap();

    let outcome = h.service.run_tests(run.run_id, "cargo test").await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(h.tests.commands(), vec!["cargo test"]);

    let history = h.service.workflow().history(run.run_id);
    assert_eq!(names(&history), vec!["started", "testsRequested", "testsCompleted"]);
    assert!(matches!(
        history[2].kind,
        WorkflowEventKind::TestsCompleted { exit_code: 0, error: None, .. }
    ));
}

#[tokio::test]
async fn broken_test_runner_reports_minus_one() {
    let executor = ScriptedExecutor::new().then(vec![ScriptItem::Hang]);
    let h = TestHarness::with_parts(
        executor,
        FakeTestRunner::broken(io::ErrorKind::NotFound),
        SddConfig::new(),
    );
    let run = h.service.start_workflow("001", "verify", None, None).await.unwrap();

    let outcome = h.service.run_tests(run.run_id, "make test").await.unwrap();
    assert_eq!(outcome.exit_code, -1);
    let history = h.service.workflow().history(run.run_id);
    assert!(matches!(
        &history[2].kind,
        WorkflowEventKind::TestsCompleted { exit_code: -1, error: Some(_), .. }
    ));

    h.service.control(run.run_id, ControlAction::Cancel, None).await.unwrap();
    let after = h.service.run_tests(run.run_id, "make test").await;
    assert!(matches!(after, Err(SddError::InvalidState(_))));
}

#[tokio::test]
async fn global_subscription_sees_every_run() {
    let executor = ScriptedExecutor::new()
        .then(vec![say("one")])
        .then(vec![say("two")]);
    let h = TestHarness::new(executor, ApplyPolicy::Manual);
    let all = h.service.subscribe_workflow(None).unwrap();

    let first = h.service.start_workflow("001", "a", None, None).await.unwrap();
    until(&all, "runCompleted").await;
    let second = h.service.start_workflow("002", "b", None, None).await.unwrap();
    let done = until(&all, "runCompleted").await;

    assert_eq!(done.run_id, second.run_id);
    assert_ne!(first.run_id, second.run_id);
}
