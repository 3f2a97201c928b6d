//! Telegram adapter (teloxide).
//!
//! This crate implements the `lounas-core` MessagingPort over Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod render;
pub mod router;

use lounas_core::{
    blocks::Block,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::MessagingPort,
    Result,
};

use crate::render::{keyboard, placeholder_html, render_html};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::Api(
                ApiError::MessageToEditNotFound
                | ApiError::MessageIdInvalid
                | ApiError::MessageToDeleteNotFound,
            ) => Error::MessageNotFound(e.to_string()),
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    /// Edits that change nothing are rejected by Telegram; treat them as done.
    fn ignore_not_modified<T>(
        res: std::result::Result<T, RequestError>,
    ) -> std::result::Result<(), RequestError> {
        match res {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }

    async fn edit(
        &self,
        msg: MessageRef,
        html: String,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        self.with_retry(|| {
            let html = html.clone();
            let markup = markup.clone();
            let bot = self.bot.clone();
            async move {
                let req = bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        html,
                    )
                    .parse_mode(ParseMode::Html);
                let res = match markup {
                    Some(m) => req.reply_markup(m).await,
                    None => req.await,
                };
                Self::ignore_not_modified(res)
            }
        })
        .await
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_blocks(&self, chat_id: ChatId, blocks: &[Block]) -> Result<MessageRef> {
        let html = render_html(blocks);
        let markup = keyboard(blocks);
        let msg = self
            .with_retry(|| {
                let req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), html.clone())
                    .parse_mode(ParseMode::Html);
                match markup.clone() {
                    Some(m) => req.reply_markup(m),
                    None => req,
                }
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn update_blocks(&self, msg: MessageRef, blocks: &[Block]) -> Result<()> {
        self.edit(msg, render_html(blocks), keyboard(blocks)).await
    }

    async fn blank_message(&self, msg: MessageRef, placeholder: &str) -> Result<()> {
        // No markup in the edit drops the inline keyboard.
        self.edit(msg, placeholder_html(placeholder), None).await
    }

    async fn react(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        // Reactions are not in the Bot API version teloxide 0.12 speaks; best-effort.
        debug!("Skipping reaction {emoji} on {msg}");
        Ok(())
    }
}
