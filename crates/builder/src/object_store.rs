use async_trait::async_trait;
use slog::{debug, info, Logger};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Object store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid object pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Failed to list objects: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("No objects match: {0}")]
    NotFound(String),
    #[error("Object store request failed: {0}")]
    Backend(String),
}

/// Where exported tables and finished datasets are kept
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Keys matching a glob pattern, sorted
    async fn list(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Copies every object matching `pattern` into `dir`, keeping file names
    async fn download(&self, pattern: &str, dir: &Path) -> Result<Vec<PathBuf>, StoreError>;

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// Last path segment of an object key
pub fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Object store backed by a local directory, keys are relative paths
pub struct LocalObjectStore {
    root: PathBuf,
    logger: Logger,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, logger: Logger) -> Self {
        Self {
            root: root.into(),
            logger,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let full_pattern = self.object_path(pattern);
        let mut keys = Vec::new();
        for entry in glob::glob(&full_pattern.to_string_lossy())? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(&self.root) {
                keys.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        keys.sort();
        debug!(self.logger, "{} objects match {}", keys.len(), pattern);
        Ok(keys)
    }

    async fn download(&self, pattern: &str, dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let keys = self.list(pattern).await?;
        if keys.is_empty() {
            return Err(StoreError::NotFound(pattern.to_owned()));
        }
        fs::create_dir_all(dir).await?;

        let mut downloaded = Vec::with_capacity(keys.len());
        for key in keys {
            let target = dir.join(key_file_name(&key));
            fs::copy(self.object_path(&key), &target).await?;
            info!(self.logger, "downloaded {} to {}", key, target.display());
            downloaded.push(target);
        }
        Ok(downloaded)
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let target = self.object_path(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(local_path, &target).await?;
        info!(self.logger, "uploaded {} as {}", local_path.display(), key);
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let target = self.object_path(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, bytes).await?;
        debug!(self.logger, "wrote object {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard};

    fn store(root: &Path) -> LocalObjectStore {
        LocalObjectStore::new(root, Logger::root(Discard, o!()))
    }

    #[tokio::test]
    async fn puts_lists_and_downloads_by_pattern() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let store = store(root.path());

        store.put("exports/run_a.csv", b"a".to_vec()).await.unwrap();
        store.put("exports/run_b.csv", b"b".to_vec()).await.unwrap();
        store.put("other/run_c.csv", b"c".to_vec()).await.unwrap();

        let keys = store.list("exports/*.csv").await.unwrap();
        assert_eq!(keys, vec!["exports/run_a.csv", "exports/run_b.csv"]);

        let files = store.download("exports/run_b*", out.path()).await.unwrap();
        assert_eq!(files, vec![out.path().join("run_b.csv")]);
        assert_eq!(std::fs::read(&files[0]).unwrap(), b"b");
    }

    #[tokio::test]
    async fn download_without_match_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let result = store(root.path()).download("missing_*.csv", out.path()).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn upload_creates_parent_folders() {
        let root = tempfile::tempdir().unwrap();
        let local = root.path().join("local.csv");
        std::fs::write(&local, "x").unwrap();
        let store = store(root.path());
        store.upload(&local, "predict_dfs/june_predict_df.csv").await.unwrap();
        assert!(root.path().join("predict_dfs/june_predict_df.csv").is_file());
        assert_eq!(key_file_name("predict_dfs/june_predict_df.csv"), "june_predict_df.csv");
    }
}
