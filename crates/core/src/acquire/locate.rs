//! Finding media references in chat.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::chat::{ChatContext, ChatMessage, EmbedKind, MessageKind, StickerFormat};
use super::AcquireError;

/// Remote lookups needed to turn embeds into downloadable URLs.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Raw GIF URL for a Tenor post id. `None` when lookups are not configured.
    async fn resolve_tenor(&self, id: &str) -> Result<Option<String>, AcquireError>;

    /// Declared `Content-Length` of a URL; `None` when the server declares none.
    async fn content_length(&self, url: &str) -> Result<Option<u64>, AcquireError>;
}

static TENOR_VIEW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https?://tenor\.com/view/([\w\d]+-)*(\d+)/?$").unwrap());

/// Extracts the numeric post id from a Tenor page URL.
pub fn tenor_id(url: &str) -> Option<String> {
    TENOR_VIEW
        .captures(url)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Searches chat for media URLs.
pub struct MediaLocator {
    resolver: Arc<dyn LinkResolver>,
    history_limit: usize,
}

impl MediaLocator {
    pub fn new(resolver: Arc<dyn LinkResolver>, history_limit: usize) -> Self {
        Self {
            resolver,
            history_limit,
        }
    }

    /// Finds `n` media URLs.
    ///
    /// Searches the trigger, then its reply target, then channel history
    /// newest first, stopping once `n` are collected. Returns `None` if the
    /// search runs out first.
    pub async fn locate(
        &self,
        ctx: &dyn ChatContext,
        n: usize,
    ) -> Result<Option<Vec<String>>, AcquireError> {
        let mut found = Vec::new();
        if n == 0 {
            return Ok(Some(found));
        }
        let mut checked = HashSet::new();

        let trigger = ctx.message();
        checked.insert(trigger.id);
        found.extend(self.message_media(trigger).await?);
        if found.len() >= n {
            found.truncate(n);
            return Ok(Some(found));
        }

        if let Some(parent) = ctx.replied_to() {
            checked.insert(parent.id);
            found.extend(self.message_media(parent).await?);
            if found.len() >= n {
                found.truncate(n);
                return Ok(Some(found));
            }
        }

        for message in ctx.history(self.history_limit).await? {
            if !checked.insert(message.id) {
                continue;
            }
            found.extend(self.message_media(&message).await?);
            if found.len() >= n {
                found.truncate(n);
                return Ok(Some(found));
            }
        }

        debug!(required = n, found = found.len(), "Not enough media in channel");
        Ok(None)
    }

    /// Media URLs carried by one message: embeds, then attachments, then stickers.
    pub async fn message_media(&self, message: &ChatMessage) -> Result<Vec<String>, AcquireError> {
        let message = match (message.kind, message.reference.as_deref()) {
            (MessageKind::ThreadStarter, Some(parent)) => parent,
            _ => message,
        };
        let mut urls = Vec::new();

        for embed in &message.embeds {
            let Some(url) = embed.url.as_deref() else {
                continue;
            };
            match embed.kind {
                EmbedKind::Gifv => {
                    if let Some(id) = tenor_id(url) {
                        if let Some(gif) = self.resolver.resolve_tenor(&id).await? {
                            urls.push(gif);
                        }
                    }
                }
                EmbedKind::Image | EmbedKind::Video | EmbedKind::Audio => {
                    // Page links (video players and such) declare no length.
                    if self
                        .resolver
                        .content_length(url)
                        .await?
                        .is_some_and(|len| len > 0)
                    {
                        urls.push(url.to_string());
                    }
                }
                EmbedKind::Other => {}
            }
        }

        urls.extend(
            message
                .attachments
                .iter()
                .filter(|a| !a.filename.ends_with("txt"))
                .map(|a| a.url.clone()),
        );

        for sticker in &message.stickers {
            if sticker.format == StickerFormat::Lottie {
                info!(message = message.id, "Skipping lottie sticker");
            } else {
                urls.push(sticker.url.clone());
            }
        }

        Ok(urls)
    }
}
