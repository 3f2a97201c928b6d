use std::sync::Arc;

use teloxide::prelude::*;
use tracing::error;

use lounas_core::{
    domain::{ChatId, MessageId, MessageRef},
    service::IncomingText,
};

use crate::handlers::voter;
use crate::router::AppState;

const FAILED: &str = "Lounaslistojen haku epäonnistui 😞";

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    let incoming = IncomingText {
        chat_id,
        message: Some(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }),
        sender: voter(user),
        text: text.to_string(),
    };

    if let Err(e) = state.service.handle_text(incoming).await {
        error!("Handling message in chat {} failed: {e}", chat_id.0);
        let _ = bot.send_message(msg.chat.id, FAILED).await;
    }
    Ok(())
}
