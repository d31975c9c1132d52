//! Delivery collaborator that records what it was given.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::processor::{Artifact, Delivery, JobStatus};

/// A recorded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    /// A file, with its size at delivery time.
    File { path: PathBuf, bytes: u64 },
    Text(String),
}

#[derive(Debug, Default)]
struct Recorded {
    statuses: Vec<JobStatus>,
    artifacts: Vec<Delivered>,
    notices: Vec<String>,
}

/// Records statuses, artifacts and notices for assertions.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    recorded: Mutex<Recorded>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.lock().statuses.clone()
    }

    pub fn artifacts(&self) -> Vec<Delivered> {
        self.lock().artifacts.clone()
    }

    /// Delivered status texts, in order.
    pub fn texts(&self) -> Vec<String> {
        self.lock()
            .artifacts
            .iter()
            .filter_map(|a| match a {
                Delivered::Text(text) => Some(text.clone()),
                Delivered::File { .. } => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.lock().notices.clone()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn notify(&self, status: JobStatus) {
        self.lock().statuses.push(status);
    }

    async fn deliver(&self, artifact: Artifact<'_>) {
        let delivered = match artifact {
            Artifact::File(path) => Delivered::File {
                path: path.to_path_buf(),
                bytes: tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0),
            },
            Artifact::Text(text) => Delivered::Text(text.to_string()),
        };
        self.lock().artifacts.push(delivered);
    }

    async fn notice(&self, message: &str) {
        self.lock().notices.push(message.to_string());
    }
}
