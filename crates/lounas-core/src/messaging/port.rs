use async_trait::async_trait;

use crate::{
    blocks::Block,
    domain::{ChatId, MessageRef},
    Result,
};

/// What the core needs from a chat transport.
///
/// Implementations report a message that no longer exists as
/// `Error::MessageNotFound` so callers can treat it as already handled.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_blocks(&self, chat_id: ChatId, blocks: &[Block]) -> Result<MessageRef>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Replace the content (and buttons) of a previously sent message.
    async fn update_blocks(&self, msg: MessageRef, blocks: &[Block]) -> Result<()>;

    /// Replace the whole message with a plain placeholder, dropping buttons.
    async fn blank_message(&self, msg: MessageRef, placeholder: &str) -> Result<()>;

    async fn react(&self, msg: MessageRef, emoji: &str) -> Result<()>;
}
