//! External collaborators
//!
//! The core never touches the disk, the model or the test harness directly;
//! it goes through these traits. Local implementations are provided for the
//! file system and for running test commands.

use crate::workflow::{CancelToken, Proposal, Step};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use sdd_ledger::{ContentHash, FileOpKind};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

/// Notification from the file watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub op: FileOpKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_before: Option<ContentHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_after: Option<ContentHash>,
}

impl FileChange {
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

/// File content together with its content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub hash: ContentHash,
}

impl FileContent {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let hash = ContentHash::compute(content.as_bytes());
        Self { content, hash }
    }
}

/// File-system collaborator
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read_file(&self, path: &str) -> io::Result<FileContent>;

    async fn write_file(&self, path: &str, content: &str) -> io::Result<()>;

    /// Stream of changes under `root`; ends when watching stops
    fn watch(&self, root: &str) -> BoxStream<'static, FileChange>;
}

/// [`FileSystem`] over a workspace directory using `tokio::fs`
///
/// Paths are workspace-relative; anything escaping the root is refused.
/// Watching is provided by an external watcher, so `watch` yields nothing.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path outside workspace: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &str) -> io::Result<FileContent> {
        let full = self.resolve(path)?;
        let content = tokio::fs::read_to_string(full).await?;
        Ok(FileContent::new(content))
    }

    async fn write_file(&self, path: &str, content: &str) -> io::Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full, content).await
    }

    fn watch(&self, _root: &str) -> BoxStream<'static, FileChange> {
        stream::empty().boxed()
    }
}

/// What the engine asks the executor to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRequest {
    pub feature_id: String,
    pub goal: String,
    /// Step to start from; the executor walks forward from here
    pub step: Step,
}

/// Streamed executor output
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    ContextLoaded { files: Vec<String> },
    StepStarted { step: Step },
    OutputAppended { text: String },
    /// Candidate change set
    Proposal(Proposal),
    /// Executor gave up; ends the stream
    Failed { message: String },
}

/// Step executor collaborator (the model/agent writing spec, plan, tasks, code)
///
/// The stream ends after the last step. Implementations should stop soon
/// after `cancel` fires; the engine does not rely on it.
pub trait StepExecutor: Send + Sync {
    fn run_step(&self, request: StepRequest, cancel: CancelToken) -> BoxStream<'static, StepOutput>;
}

/// Result of a test command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Test-runner collaborator
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run(&self, command: &str) -> io::Result<TestOutcome>;
}

/// Runs test commands through `sh -c` in the workspace root
#[derive(Debug, Clone)]
pub struct ProcessTestRunner {
    root: PathBuf,
}

impl ProcessTestRunner {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl TestRunner for ProcessTestRunner {
    async fn run(&self, command: &str) -> io::Result<TestOutcome> {
        let started = Instant::now();
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .status()
            .await?;
        Ok(TestOutcome {
            exit_code: status.code().unwrap_or(-1),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_fs_round_trip_with_hash() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(dir.path());

        fs.write_file("specs/001/spec.md", "# Spec").await.unwrap();
        let read = fs.read_file("specs/001/spec.md").await.unwrap();
        assert_eq!(read.content, "# Spec");
        assert_eq!(read.hash, ContentHash::compute(b"# Spec"));
    }

    #[tokio::test]
    async fn local_fs_refuses_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystem::new(dir.path());

        let err = fs.write_file("../outside.txt", "x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(fs.read_file("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn local_fs_watch_is_empty() {
        let fs = LocalFileSystem::new(".");
        assert!(fs.watch(".").next().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessTestRunner::new(dir.path());
        assert_eq!(runner.run("true").await.unwrap().exit_code, 0);
        assert_eq!(runner.run("exit 3").await.unwrap().exit_code, 3);
    }
}
