//! Delivery into a local directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info};

use mediaforge_core::processor::{Artifact, Delivery, JobStatus};

/// Copies result files into a directory and prints status text.
///
/// The copy outlives the job; the original is deleted with the job's scope.
pub struct DirectoryDelivery {
    out_dir: PathBuf,
    saved: Mutex<Vec<PathBuf>>,
}

impl DirectoryDelivery {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            saved: Mutex::new(Vec::new()),
        }
    }

    /// Files written so far.
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn save(&self, path: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.out_dir).await?;
        let name = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("result"));
        let target = self.out_dir.join(name);
        tokio::fs::copy(path, &target).await?;
        Ok(target)
    }
}

#[async_trait]
impl Delivery for DirectoryDelivery {
    async fn notify(&self, status: JobStatus) {
        eprintln!("{}", status);
    }

    async fn deliver(&self, artifact: Artifact<'_>) {
        match artifact {
            Artifact::Text(text) => println!("{}", text),
            Artifact::File(path) => match self.save(path).await {
                Ok(target) => {
                    info!(path = %target.display(), "Result saved");
                    println!("{}", target.display());
                    self.saved
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(target);
                }
                Err(e) => error!(path = %path.display(), "Failed to save result: {}", e),
            },
        }
    }

    async fn notice(&self, message: &str) {
        eprintln!("{}", message);
    }
}
