//! Feature discovery

use crate::error::{SddError, SddResult};
use crate::types::Feature;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

const SPEC_FILE: &str = "spec.md";
const PLAN_FILE: &str = "plan.md";
const TASKS_FILE: &str = "tasks.md";

/// Source of the features known to a workspace
#[async_trait]
pub trait FeatureCatalog: Send + Sync {
    async fn list_features(&self) -> SddResult<Vec<Feature>>;
}

/// Every `<features_dir>/<featureId>/` holding a `spec.md` is a feature
#[derive(Debug, Clone)]
pub struct DirectoryFeatureCatalog {
    root: PathBuf,
    features_dir: PathBuf,
}

impl DirectoryFeatureCatalog {
    /// `features_dir` is relative to `root`; reported paths are too
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, features_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            features_dir: features_dir.into(),
        }
    }

    fn relative(&self, feature_id: &str, file: &str) -> String {
        let path = self.features_dir.join(feature_id).join(file);
        path.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

#[async_trait]
impl FeatureCatalog for DirectoryFeatureCatalog {
    async fn list_features(&self) -> SddResult<Vec<Feature>> {
        let dir = self.root.join(&self.features_dir);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(dir = %dir.display(), "no features directory");
                return Ok(Vec::new());
            }
            Err(e) => return Err(unreadable(&dir, e)),
        };

        let mut features = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| unreadable(&dir, e))? {
            let feature_dir = entry.path();
            let Some(feature_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !fs::metadata(&feature_dir).await.is_ok_and(|m| m.is_dir())
                || !is_file(&feature_dir.join(SPEC_FILE)).await
            {
                continue;
            }

            let plan_path = if is_file(&feature_dir.join(PLAN_FILE)).await {
                Some(self.relative(&feature_id, PLAN_FILE))
            } else {
                None
            };
            let tasks_path = if is_file(&feature_dir.join(TASKS_FILE)).await {
                Some(self.relative(&feature_id, TASKS_FILE))
            } else {
                None
            };
            features.push(Feature {
                spec_path: self.relative(&feature_id, SPEC_FILE),
                plan_path,
                tasks_path,
                feature_id,
            });
        }

        features.sort_by(|a, b| a.feature_id.cmp(&b.feature_id));
        Ok(features)
    }
}

fn unreadable(dir: &Path, e: io::Error) -> SddError {
    SddError::NotFound(format!("cannot list {}: {e}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn discovers_features_with_specs() {
        let dir = TempDir::new().unwrap();
        let specs = dir.path().join("specs");
        std::fs::create_dir_all(specs.join("002-export")).unwrap();
        std::fs::create_dir_all(specs.join("001-login")).unwrap();
        std::fs::create_dir_all(specs.join("draft")).unwrap();
        std::fs::write(specs.join("002-export/spec.md"), "# Export").unwrap();
        std::fs::write(specs.join("001-login/spec.md"), "# Login").unwrap();
        std::fs::write(specs.join("001-login/tasks.md"), "- [ ] T1").unwrap();
        std::fs::write(specs.join("README.md"), "not a feature").unwrap();

        let features = DirectoryFeatureCatalog::new(dir.path(), "specs")
            .list_features()
            .await
            .unwrap();

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].feature_id, "001-login");
        assert_eq!(features[0].spec_path, "specs/001-login/spec.md");
        assert_eq!(features[0].tasks_path.as_deref(), Some("specs/001-login/tasks.md"));
        assert!(features[0].plan_path.is_none());
        assert_eq!(features[1].feature_id, "002-export");
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let features = DirectoryFeatureCatalog::new(dir.path(), "specs")
            .list_features()
            .await
            .unwrap();
        assert!(features.is_empty());
    }
}
