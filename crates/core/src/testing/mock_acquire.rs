//! Mock chat, link resolver and fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::acquire::{
    extension_from_url, is_tenor_mp4, AcquireError, ChatContext, ChatMessage, LinkResolver,
    MediaFetcher,
};
use crate::tempfiles::{NameHint, TempScope};

/// Mock chat context: a triggering message plus channel history.
#[derive(Debug)]
pub struct MockChat {
    message: ChatMessage,
    history: Vec<ChatMessage>,
    history_requests: AtomicUsize,
    last_history_limit: Mutex<Option<usize>>,
}

impl MockChat {
    pub fn new(message: ChatMessage) -> Self {
        Self {
            message,
            history: Vec::new(),
            history_requests: AtomicUsize::new(0),
            last_history_limit: Mutex::new(None),
        }
    }

    /// Channel history, newest first.
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// How many times history was fetched.
    pub fn history_requests(&self) -> usize {
        self.history_requests.load(Ordering::SeqCst)
    }

    pub fn last_history_limit(&self) -> Option<usize> {
        *self
            .last_history_limit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChatContext for MockChat {
    fn message(&self) -> &ChatMessage {
        &self.message
    }

    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>, AcquireError> {
        self.history_requests.fetch_add(1, Ordering::SeqCst);
        *self
            .last_history_limit
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(limit);
        Ok(self.history.iter().take(limit).cloned().collect())
    }
}

/// Mock link resolver with canned content lengths and Tenor lookups.
#[derive(Debug, Default)]
pub struct MockResolver {
    lengths: HashMap<String, u64>,
    tenor: HashMap<String, String>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `length` as the declared size of `url`.
    pub fn with_length(mut self, url: impl Into<String>, length: u64) -> Self {
        self.lengths.insert(url.into(), length);
        self
    }

    /// Resolve Tenor post `id` to `url`.
    pub fn with_tenor(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.tenor.insert(id.into(), url.into());
        self
    }
}

#[async_trait]
impl LinkResolver for MockResolver {
    async fn resolve_tenor(&self, id: &str) -> Result<Option<String>, AcquireError> {
        Ok(self.tenor.get(id).cloned())
    }

    async fn content_length(&self, url: &str) -> Result<Option<u64>, AcquireError> {
        Ok(self.lengths.get(url).copied())
    }
}

type ErrorFactory = Box<dyn Fn() -> AcquireError + Send + Sync>;

/// Mock fetcher serving canned bodies by URL.
///
/// Unknown URLs fail with HTTP 404.
#[derive(Default)]
pub struct MockFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, ErrorFactory>>,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn serve(&self, url: impl Into<String>, body: Vec<u8>) {
        self.bodies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), body);
    }

    /// Fail fetches of `url` with the error `make` builds.
    pub fn fail(
        &self,
        url: impl Into<String>,
        make: impl Fn() -> AcquireError + Send + Sync + 'static,
    ) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), Box::new(make));
    }

    /// URLs fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, url: &str, scope: &mut TempScope) -> Result<PathBuf, AcquireError> {
        self.fetched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        let hint = if is_tenor_mp4(url) {
            NameHint::Extension("mp4".to_string())
        } else {
            NameHint::from(extension_from_url(url).as_deref())
        };
        let path = scope.reserve(hint);

        if let Some(make) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
        {
            return Err(make());
        }
        let body = self
            .bodies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned();
        let Some(body) = body else {
            return Err(AcquireError::Http {
                url: url.to_string(),
                status: 404,
            });
        };
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
