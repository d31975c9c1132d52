//! Chat context for running a command from the shell.

use async_trait::async_trait;

use mediaforge_core::acquire::{AcquireError, ChatContext, ChatMessage};

/// A one-message chat whose trigger carries the given URLs as attachments.
///
/// There is no channel history to search.
pub struct LocalChat {
    message: ChatMessage,
}

impl LocalChat {
    pub fn new(urls: &[String]) -> Self {
        let message = urls.iter().fold(ChatMessage::new(1), |message, url| {
            message.with_attachment(file_name(url), url.as_str())
        });
        Self { message }
    }
}

fn file_name(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

#[async_trait]
impl ChatContext for LocalChat {
    fn message(&self) -> &ChatMessage {
        &self.message
    }

    async fn history(&self, _limit: usize) -> Result<Vec<ChatMessage>, AcquireError> {
        Ok(Vec::new())
    }
}
