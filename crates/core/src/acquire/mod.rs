//! Media acquisition: finding media in chat and downloading it.
//!
//! Location walks the triggering message, the message it replies to, and
//! then recent channel history. Download enforces the declared size before
//! any of the body is read, writing into a path reserved in the caller's
//! scope.

mod chat;
mod download;
mod locate;

pub use chat::{
    Attachment, ChatContext, ChatMessage, Embed, EmbedKind, MessageKind, Sticker, StickerFormat,
};
pub use download::{extension_from_url, is_tenor_mp4, MediaDownloader, MediaFetcher};
pub use locate::{tenor_id, LinkResolver, MediaLocator};

use thiserror::Error;

/// Errors that can occur while locating or downloading media.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Declared size exceeds the download limit.
    #[error("File is too big ({size} bytes); downloads are limited to {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The server did not declare a size.
    #[error("Unable to determine the size of {url}")]
    SizeUnknown { url: String },

    /// Non-200 response.
    #[error("Download of {url} failed with HTTP {status}")]
    Http { url: String, status: u16 },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A short-link lookup answered with something unusable.
    #[error("Link lookup failed: {0}")]
    Lookup(String),

    /// The chat platform failed to answer.
    #[error("Chat error: {0}")]
    Chat(String),

    /// Writing the download failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcquireError {
    /// Network hiccups the user can simply retry: timeouts, refused
    /// connections and servers dropping the connection mid-body.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => {
                !e.is_builder()
                    && e.status().is_none()
                    && (e.is_timeout()
                        || e.is_connect()
                        || e.is_body()
                        || e.is_decode()
                        || e.is_request())
            }
            _ => false,
        }
    }

    /// Label used for the failed-download metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::SizeUnknown { .. } => "size_unknown",
            Self::Http { .. } => "http",
            Self::Request(_) => "request",
            Self::Lookup(_) => "lookup",
            Self::Chat(_) => "chat",
            Self::Io(_) => "io",
        }
    }
}
