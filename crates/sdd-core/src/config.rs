//! Workspace configuration
//!
//! Loaded from `<workspace>/.sdd/config.toml`; every field has a default so
//! an absent or partial file is fine.

use crate::error::{SddError, SddResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Location of the config file relative to the workspace root
pub const CONFIG_FILE: &str = ".sdd/config.toml";

/// Default in-memory event window per workflow run
pub const DEFAULT_HISTORY_WINDOW: usize = 200;

/// Default number of finished workflow runs kept in memory
pub const DEFAULT_RETAINED_RUNS: usize = 32;

/// SDD configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SddConfig {
    /// Ledger file, relative to the workspace root unless absolute
    pub ledger_path: PathBuf,
    /// Directory holding one sub-directory per feature
    pub features_dir: PathBuf,
    /// Actor recorded on ledger events
    pub actor: String,
    /// Block commits while untracked code changes exist
    pub block_commit_on_untracked_code_changes: bool,
    /// Workflow engine settings
    pub workflow: WorkflowConfig,
}

impl SddConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<root>/.sdd/config.toml`, falling back to defaults when absent
    ///
    /// # Errors
    /// `SddError::Config` if the file exists but is unreadable or invalid
    pub fn load(root: &Path) -> SddResult<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| SddError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `SddError::Config` on syntax errors or invalid values
    pub fn from_toml(text: &str) -> SddResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SddError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// With blocking policy
    #[inline]
    #[must_use]
    pub fn with_commit_blocking(mut self, block: bool) -> Self {
        self.block_commit_on_untracked_code_changes = block;
        self
    }

    /// With finished workflow runs kept in memory
    #[must_use]
    pub fn with_retained_runs(mut self, runs: usize) -> Self {
        self.workflow.retained_runs = runs;
        self
    }

    /// With workflow apply policy
    #[inline]
    #[must_use]
    pub fn with_apply_policy(mut self, policy: ApplyPolicy) -> Self {
        self.workflow.apply_policy = policy;
        self
    }

    /// Absolute ledger path for a workspace root
    #[must_use]
    pub fn ledger_path_in(&self, root: &Path) -> PathBuf {
        root.join(&self.ledger_path)
    }

    fn validate(&self) -> SddResult<()> {
        if self.actor.trim().is_empty() {
            return Err(SddError::Config("actor must not be empty".to_string()));
        }
        let workflow = &self.workflow;
        if workflow.history_window == 0 || workflow.subscriber_capacity == 0 || workflow.retained_runs == 0 {
            return Err(SddError::Config(
                "workflow queue sizes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SddConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(".sdd/ledger.jsonl"),
            features_dir: PathBuf::from("specs"),
            actor: "user".to_string(),
            block_commit_on_untracked_code_changes: false,
            workflow: WorkflowConfig::default(),
        }
    }
}

/// Workflow engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// How produced proposals are handled
    pub apply_policy: ApplyPolicy,
    /// In-memory events kept per run for late subscribers
    pub history_window: usize,
    /// Per-subscriber queue capacity
    pub subscriber_capacity: usize,
    /// Finished runs whose state and history stay in memory; older ones
    /// are only reachable through the ledger
    pub retained_runs: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            apply_policy: ApplyPolicy::Manual,
            history_window: DEFAULT_HISTORY_WINDOW,
            subscriber_capacity: DEFAULT_HISTORY_WINDOW,
            retained_runs: DEFAULT_RETAINED_RUNS,
        }
    }
}

/// Proposal handling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyPolicy {
    /// Emit `proposalReady` and apply immediately
    Auto,
    /// Emit `approvalRequired` and wait for `applyProposal`
    Manual,
}

/// Settings collaborator
pub trait Settings: Send + Sync {
    fn block_commit_on_untracked_code_changes(&self) -> bool;
}

impl Settings for SddConfig {
    fn block_commit_on_untracked_code_changes(&self) -> bool {
        self.block_commit_on_untracked_code_changes
    }
}

/// Settings that can be flipped at runtime
#[derive(Debug, Default)]
pub struct SharedSettings {
    block_commit: AtomicBool,
}

impl SharedSettings {
    #[must_use]
    pub fn new(block_commit: bool) -> Self {
        Self {
            block_commit: AtomicBool::new(block_commit),
        }
    }

    pub fn set_block_commit(&self, block: bool) {
        self.block_commit.store(block, Ordering::SeqCst);
    }
}

impl From<&SddConfig> for SharedSettings {
    fn from(config: &SddConfig) -> Self {
        Self::new(config.block_commit_on_untracked_code_changes)
    }
}

impl Settings for SharedSettings {
    fn block_commit_on_untracked_code_changes(&self) -> bool {
        self.block_commit.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SddConfig::new();
        assert_eq!(config.ledger_path, PathBuf::from(".sdd/ledger.jsonl"));
        assert_eq!(config.workflow.history_window, 200);
        assert_eq!(config.workflow.retained_runs, DEFAULT_RETAINED_RUNS);
        assert_eq!(config.workflow.apply_policy, ApplyPolicy::Manual);
        assert!(!config.block_commit_on_untracked_code_changes);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SddConfig::from_toml(
            r#"
            block_commit_on_untracked_code_changes = true

            [workflow]
            apply_policy = "auto"
            "#,
        )
        .unwrap();
        assert!(config.block_commit_on_untracked_code_changes);
        assert_eq!(config.workflow.apply_policy, ApplyPolicy::Auto);
        assert_eq!(config.workflow.subscriber_capacity, 200);
        assert_eq!(config.actor, "user");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            SddConfig::from_toml("actor = \"\""),
            Err(SddError::Config(_))
        ));
        assert!(SddConfig::from_toml("[workflow]\nhistory_window = 0").is_err());
        assert!(SddConfig::from_toml("[workflow]\nretained_runs = 0").is_err());
        assert!(SddConfig::from_toml("ledger_path = [").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SddConfig::load(dir.path()).unwrap();
        assert_eq!(config, SddConfig::default());
    }

    #[test]
    fn shared_settings_toggle() {
        let settings = SharedSettings::from(&SddConfig::new());
        assert!(!settings.block_commit_on_untracked_code_changes());
        settings.set_block_commit(true);
        assert!(settings.block_commit_on_untracked_code_changes());
    }
}
