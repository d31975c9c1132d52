//! Downloading media over HTTP.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::locate::LinkResolver;
use super::AcquireError;
use crate::config::TenorConfig;
use crate::metrics;
use crate::tempfiles::{NameHint, TempScope};

const DEFAULT_TENOR_BASE_URL: &str = "https://tenor.googleapis.com";

/// Fetches a URL into a file reserved in the caller's scope.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, scope: &mut TempScope) -> Result<PathBuf, AcquireError>;
}

/// Tenor serves some GIFs as MP4 under extensionless `/mp4` URLs.
pub fn is_tenor_mp4(url: &str) -> bool {
    url.starts_with("https://media.tenor.com") && url.ends_with("/mp4")
}

/// Extension of the last path segment, query stripped.
pub fn extension_from_url(url: &str) -> Option<String> {
    let segment = url.rsplit('/').next()?;
    let segment = segment.split('?').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    Some(ext.to_string())
}

#[derive(Deserialize)]
struct TenorResponse {
    #[serde(default)]
    results: Vec<TenorPost>,
}

#[derive(Deserialize)]
struct TenorPost {
    media_formats: TenorFormats,
}

#[derive(Deserialize)]
struct TenorFormats {
    gif: Option<TenorMedia>,
}

#[derive(Deserialize)]
struct TenorMedia {
    url: String,
}

/// HTTP downloader and link resolver.
pub struct MediaDownloader {
    client: Client,
    max_download_size: u64,
    tenor: Option<TenorConfig>,
}

impl MediaDownloader {
    /// Creates a downloader enforcing `max_download_size` bytes.
    pub fn new(max_download_size: u64, tenor: Option<TenorConfig>) -> Result<Self, AcquireError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            client,
            max_download_size,
            tenor,
        })
    }

    /// Sends a GET and reads the declared length, leaving the body unread.
    async fn declared_length(&self, url: &str) -> Result<(reqwest::Response, Option<u64>), AcquireError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AcquireError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        Ok((response, length))
    }
}

#[async_trait]
impl MediaFetcher for MediaDownloader {
    async fn fetch(&self, url: &str, scope: &mut TempScope) -> Result<PathBuf, AcquireError> {
        let extension = if is_tenor_mp4(url) {
            Some("mp4".to_string())
        } else {
            extension_from_url(url)
        };
        // Reserved before the request so a failed write is still cleaned up.
        let path = scope.reserve(NameHint::from(extension.as_deref()));
        metrics::DOWNLOADS_STARTED.inc();

        let result: Result<(), AcquireError> = async {
            let (response, length) = self.declared_length(url).await?;
            let Some(size) = length else {
                return Err(AcquireError::SizeUnknown {
                    url: url.to_string(),
                });
            };
            info!(url, size, "Downloading");
            if size > self.max_download_size {
                return Err(AcquireError::TooLarge {
                    size,
                    limit: self.max_download_size,
                });
            }
            let mut file = tokio::fs::File::create(&path).await?;
            let mut body = response.bytes_stream();
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            metrics::DOWNLOAD_BYTES.inc_by(written);
            Ok::<(), AcquireError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(url, path = %path.display(), "Saved");
                Ok(path)
            }
            Err(e) => {
                warn!(url, error = %e, "Download failed");
                metrics::DOWNLOADS_FAILED.with_label_values(&[e.reason()]).inc();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LinkResolver for MediaDownloader {
    async fn resolve_tenor(&self, id: &str) -> Result<Option<String>, AcquireError> {
        let Some(tenor) = &self.tenor else {
            debug!(id, "Tenor lookup skipped, no API key configured");
            return Ok(None);
        };
        let base = tenor.base_url.as_deref().unwrap_or(DEFAULT_TENOR_BASE_URL);
        let url = format!("{}/v2/posts", base.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("ids", id), ("key", tenor.api_key.as_str()), ("limit", "1")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AcquireError::Lookup(format!(
                "Tenor returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TenorResponse = response
            .json()
            .await
            .map_err(|e| AcquireError::Lookup(format!("Failed to parse Tenor response: {}", e)))?;
        parsed
            .results
            .into_iter()
            .next()
            .and_then(|post| post.media_formats.gif)
            .map(|gif| Some(gif.url))
            .ok_or_else(|| AcquireError::Lookup(format!("Tenor post {} has no GIF", id)))
    }

    async fn content_length(&self, url: &str) -> Result<Option<u64>, AcquireError> {
        match self.declared_length(url).await {
            Ok((_, length)) => Ok(length),
            Err(AcquireError::Http { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
