//! The process-wide temp directory.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::scope::{ScopeLease, TempScope};
use super::ScopeError;

/// Length of generated file names, without extension.
const NAME_LEN: usize = 8;

/// Owner of the temp directory all reserved paths live in.
///
/// Cloning is cheap; clones share the same directory.
#[derive(Debug, Clone)]
pub struct TempStore {
    dir: Arc<PathBuf>,
}

impl TempStore {
    /// Default location: in-memory `/dev/shm` when available, otherwise the
    /// system temp directory.
    pub fn default_dir() -> PathBuf {
        let shm = Path::new("/dev/shm");
        if shm.is_dir() {
            shm.join("mediaforge")
        } else {
            std::env::temp_dir().join("mediaforge")
        }
    }

    /// Wipes and recreates `dir`. Called once at process start.
    pub async fn init(dir: impl Into<PathBuf>) -> Result<Self, ScopeError> {
        let dir = dir.into();
        if tokio::fs::metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        info!("Temp directory is {:?}", dir);
        Ok(Self { dir: Arc::new(dir) })
    }

    /// Uses an existing directory as-is, without wiping it.
    ///
    /// Isolated workers attach to their parent's directory this way.
    pub fn attach(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    /// The temp directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Opens a scope for the task represented by `lease`.
    ///
    /// Fails with [`ScopeError::AlreadyOpen`] while another scope opened with
    /// the same lease is still alive.
    pub fn open_scope(&self, lease: &ScopeLease) -> Result<TempScope, ScopeError> {
        TempScope::open(self.clone(), lease.clone())
    }

    /// Picks an unused path with a random name and optional extension.
    pub fn fresh_path(&self, extension: Option<&str>) -> PathBuf {
        loop {
            let mut name = random_name(NAME_LEN);
            if let Some(ext) = extension {
                name.push('.');
                name.push_str(ext);
            }
            let candidate = self.dir.join(name);
            if !candidate.exists() {
                return candidate;
            }
        }
    }

    /// Deletes every entry in the temp directory.
    ///
    /// Recovery action for a full disk; open scopes will find their files
    /// already gone when they close. Returns the number of entries removed.
    pub async fn purge(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(self.dir.as_path()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list temp directory {:?}: {}", self.dir, e);
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error while listing temp directory: {}", e);
                    break;
                }
            };
            let path = entry.path();
            let result = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => tokio::fs::remove_dir_all(&path).await,
                _ => tokio::fs::remove_file(&path).await,
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => debug!("Failed to purge {:?}: {}", path, e),
            }
        }

        warn!("Purged {} entries from temp directory {:?}", removed, self.dir);
        removed
    }
}

/// Random ASCII-letter string.
pub(crate) fn random_name(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(char::is_ascii_alphabetic)
        .take(len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_random_name_is_letters() {
        let name = random_name(8);
        assert_eq!(name.len(), 8);
        assert!(name.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[tokio::test]
    async fn test_init_wipes_existing_dir() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("store");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("stale.png"), b"x").await.unwrap();

        let store = TempStore::init(&dir).await.unwrap();
        assert!(store.dir().is_dir());
        assert!(!dir.join("stale.png").exists());
    }

    #[tokio::test]
    async fn test_attach_keeps_contents() {
        let root = TempDir::new().unwrap();
        tokio::fs::write(root.path().join("keep.gif"), b"x").await.unwrap();

        let store = TempStore::attach(root.path());
        assert!(store.dir().join("keep.gif").exists());
    }

    #[test]
    fn test_fresh_path_layout() {
        let root = TempDir::new().unwrap();
        let store = TempStore::attach(root.path());

        let path = store.fresh_path(Some("mp4"));
        assert_eq!(path.parent().unwrap(), root.path());
        assert_eq!(path.extension().unwrap(), "mp4");
        assert_eq!(path.file_stem().unwrap().len(), 8);

        let bare = store.fresh_path(None);
        assert!(bare.extension().is_none());
    }

    #[tokio::test]
    async fn test_purge_removes_everything() {
        let root = TempDir::new().unwrap();
        let store = TempStore::attach(root.path());
        tokio::fs::write(root.path().join("a.png"), b"a").await.unwrap();
        tokio::fs::write(root.path().join("b.mp4"), b"b").await.unwrap();
        tokio::fs::create_dir(root.path().join("nested")).await.unwrap();

        let removed = store.purge().await;
        assert_eq!(removed, 3);
        let mut entries = tokio::fs::read_dir(root.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}
