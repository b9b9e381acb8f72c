//! Testing utilities for the SDD workspace
//!
//! In-memory collaborators with failure injection, plus fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use sdd_core::{
    ApplyPolicy, CancelToken, Collaborators, DirectoryFeatureCatalog, FileChange, FileContent,
    FileSystem, FileWrite, Proposal, SddConfig, SddService, SharedSettings, Step, StepExecutor,
    StepOutput, StepRequest, TestOutcome, TestRunner, Workspace,
};
use sdd_ledger::{ContentHash, DocRef, FileOpKind};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// File system held in memory
///
/// Writes are reported to every open watch stream, and individual paths can
/// be made to fail.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashMap<String, io::ErrorKind>>,
    attempts: Mutex<Vec<String>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<FileChange>>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    /// Set content without notifying watchers
    pub fn insert(&self, path: &str, content: &str) {
        self.files.lock().insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().remove(path);
    }

    #[must_use]
    pub fn contents(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    /// Make every write to `path` fail with `kind`
    pub fn fail_writes_to(&self, path: &str, kind: io::ErrorKind) {
        self.failing.lock().insert(path.to_string(), kind);
    }

    /// Paths of attempted writes, in order
    #[must_use]
    pub fn write_attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    /// Push a change to every open watch stream
    pub fn emit(&self, change: FileChange) {
        self.watchers
            .lock()
            .retain(|tx| tx.unbounded_send(change.clone()).is_ok());
    }

    /// End every watch stream
    pub fn close_watchers(&self) {
        self.watchers.lock().clear();
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read_file(&self, path: &str) -> io::Result<FileContent> {
        self.contents(path)
            .map(FileContent::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    async fn write_file(&self, path: &str, content: &str) -> io::Result<()> {
        self.attempts.lock().push(path.to_string());
        if let Some(kind) = self.failing.lock().get(path).copied() {
            return Err(io::Error::new(kind, format!("injected failure writing {path}")));
        }

        let before = self
            .files
            .lock()
            .insert(path.to_string(), content.to_string());
        let op = if before.is_some() {
            FileOpKind::Modify
        } else {
            FileOpKind::Create
        };
        self.emit(FileChange::new(path, op).with_hashes(
            before.map(|b| ContentHash::compute(b.as_bytes())),
            Some(ContentHash::compute(content.as_bytes())),
        ));
        Ok(())
    }

    fn watch(&self, _root: &str) -> BoxStream<'static, FileChange> {
        let (tx, rx) = mpsc::unbounded();
        self.watchers.lock().push(tx);
        rx.boxed()
    }
}

/// One scripted executor action
#[derive(Debug, Clone)]
pub enum ScriptItem {
    Emit(StepOutput),
    Sleep(Duration),
    /// Never yield again
    Hang,
}

/// Step executor replaying scripts, one per `run_step` call
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<VecDeque<Vec<ScriptItem>>>,
    requests: Mutex<Vec<StepRequest>>,
    ignore_cancel: bool,
}

impl ScriptedExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next attempt
    #[must_use]
    pub fn then(self, script: Vec<ScriptItem>) -> Self {
        self.scripts.lock().push_back(script);
        self
    }

    /// Keep emitting after the cancel token trips
    #[must_use]
    pub fn ignoring_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().clone()
    }
}

impl StepExecutor for ScriptedExecutor {
    fn run_step(&self, request: StepRequest, cancel: CancelToken) -> BoxStream<'static, StepOutput> {
        self.requests.lock().push(request);
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        let ignore_cancel = self.ignore_cancel;

        stream::unfold(script.into_iter(), move |mut items| {
            let cancel = cancel.clone();
            async move {
                loop {
                    if !ignore_cancel && cancel.is_cancelled() {
                        return None;
                    }
                    match items.next()? {
                        ScriptItem::Emit(output) => return Some((output, items)),
                        ScriptItem::Sleep(duration) => tokio::time::sleep(duration).await,
                        ScriptItem::Hang => futures::future::pending::<()>().await,
                    }
                }
            }
        })
        .boxed()
    }
}

/// Test runner returning a canned result
#[derive(Debug)]
pub struct FakeTestRunner {
    result: Result<TestOutcome, io::ErrorKind>,
    commands: Mutex<Vec<String>>,
}

impl FakeTestRunner {
    #[must_use]
    pub fn passing() -> Self {
        Self::exiting(0)
    }

    #[must_use]
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            result: Ok(TestOutcome {
                exit_code,
                duration_ms: 5,
            }),
            commands: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn broken(kind: io::ErrorKind) -> Self {
        Self {
            result: Err(kind),
            commands: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl TestRunner for FakeTestRunner {
    async fn run(&self, command: &str) -> io::Result<TestOutcome> {
        self.commands.lock().push(command.to_string());
        self.result
            .map_err(|kind| io::Error::new(kind, "test runner unavailable"))
    }
}

// Script helpers

pub fn say(text: &str) -> ScriptItem {
    ScriptItem::Emit(StepOutput::OutputAppended {
        text: text.to_string(),
    })
}

pub fn step(step: Step) -> ScriptItem {
    ScriptItem::Emit(StepOutput::StepStarted { step })
}

pub fn propose(writes: &[(&str, &str)]) -> ScriptItem {
    ScriptItem::Emit(StepOutput::Proposal(proposal(writes)))
}

pub fn fail(message: &str) -> ScriptItem {
    ScriptItem::Emit(StepOutput::Failed {
        message: message.to_string(),
    })
}

pub fn sleep_ms(ms: u64) -> ScriptItem {
    ScriptItem::Sleep(Duration::from_millis(ms))
}

pub fn proposal(writes: &[(&str, &str)]) -> Proposal {
    Proposal::from_writes(
        writes
            .iter()
            .map(|(path, content)| FileWrite::new(*path, *content))
            .collect(),
    )
}

/// Document reference hashed from `content`
pub fn doc(path: &str, content: &str) -> DocRef {
    DocRef::new(path, ContentHash::compute(content.as_bytes()))
}

/// Fully wired in-memory service
pub struct TestHarness {
    pub workspace: Arc<Workspace>,
    pub fs: Arc<MemoryFileSystem>,
    pub executor: Arc<ScriptedExecutor>,
    pub tests: Arc<FakeTestRunner>,
    pub settings: Arc<SharedSettings>,
    pub service: SddService,
}

impl TestHarness {
    pub fn new(executor: ScriptedExecutor, policy: ApplyPolicy) -> Self {
        Self::with_parts(executor, FakeTestRunner::passing(), SddConfig::new().with_apply_policy(policy))
    }

    pub fn with_parts(executor: ScriptedExecutor, tests: FakeTestRunner, config: SddConfig) -> Self {
        let workspace = Arc::new(Workspace::in_memory());
        let fs = Arc::new(MemoryFileSystem::new());
        let executor = Arc::new(executor);
        let tests = Arc::new(tests);
        let settings = Arc::new(SharedSettings::from(&config));
        let collab = Collaborators {
            fs: fs.clone(),
            executor: executor.clone(),
            tests: tests.clone(),
            settings: settings.clone(),
            features: Arc::new(DirectoryFeatureCatalog::new(".", &config.features_dir)),
        };
        let service = SddService::new(Arc::clone(&workspace), collab, &config);
        Self {
            workspace,
            fs,
            executor,
            tests,
            settings,
            service,
        }
    }
}
