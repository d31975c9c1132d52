//! Chat platform model, reduced to what media location needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::AcquireError;

/// How a message came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Default,
    /// Stub that opens a thread; the real content is its referenced message.
    ThreadStarter,
}

/// Embed type as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedKind {
    Image,
    Video,
    Audio,
    /// Looping video, typically a GIF site link.
    Gifv,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub kind: EmbedKind,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickerFormat {
    Png,
    Apng,
    Gif,
    /// Vector animation; cannot be decoded.
    Lottie,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub format: StickerFormat,
    pub url: String,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    #[serde(default)]
    pub kind: MessageKind,
    /// Resolved message this one replies to or starts a thread for.
    #[serde(default)]
    pub reference: Option<Box<ChatMessage>>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
}

impl ChatMessage {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, filename: impl Into<String>, url: impl Into<String>) -> Self {
        self.attachments.push(Attachment {
            filename: filename.into(),
            url: url.into(),
        });
        self
    }

    pub fn with_embed(mut self, kind: EmbedKind, url: impl Into<String>) -> Self {
        self.embeds.push(Embed {
            kind,
            url: Some(url.into()),
        });
        self
    }

    pub fn with_sticker(mut self, format: StickerFormat, url: impl Into<String>) -> Self {
        self.stickers.push(Sticker {
            format,
            url: url.into(),
        });
        self
    }

    pub fn replying_to(mut self, parent: ChatMessage) -> Self {
        self.reference = Some(Box::new(parent));
        self
    }

    pub fn starting_thread_for(mut self, parent: ChatMessage) -> Self {
        self.kind = MessageKind::ThreadStarter;
        self.reference = Some(Box::new(parent));
        self
    }
}

/// The chat context a command was invoked in.
#[async_trait]
pub trait ChatContext: Send + Sync {
    /// The message that triggered the command.
    fn message(&self) -> &ChatMessage;

    /// The message the trigger replies to, if any.
    fn replied_to(&self) -> Option<&ChatMessage> {
        self.message().reference.as_deref()
    }

    /// Up to `limit` channel messages before the trigger, newest first.
    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>, AcquireError>;
}
