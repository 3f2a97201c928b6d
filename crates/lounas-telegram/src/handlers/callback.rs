use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, warn};

use lounas_core::domain::{ChatId, MessageId, MessageRef};

use crate::handlers::voter;
use crate::render::CallbackAction;
use crate::router::AppState;

const FAILED: &str = "Jokin meni pieleen, yritä uudelleen.";

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let Some(message) = q.message.as_ref() else {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };
    if !state.cfg.settings.accepts_chat(message.chat.id.0) {
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    }

    let data = q.data.as_deref().unwrap_or_default();
    let Some(action) = CallbackAction::parse(data) else {
        warn!("Unknown callback data {data:?}");
        let _ = bot.answer_callback_query(cb_id).await;
        return Ok(());
    };

    let msg = MessageRef {
        chat_id: ChatId(message.chat.id.0),
        message_id: MessageId(message.id.0),
    };
    let result = match action {
        CallbackAction::Vote(option) => state.service.handle_vote(msg, voter(&q.from), option).await,
        CallbackAction::FetchAdditional(restaurant) => {
            state.service.fetch_additional(msg, restaurant).await
        }
    };

    // The notice goes only to the user who pressed the button.
    let notice = match result {
        Ok(notice) => notice,
        Err(e) => {
            error!("Callback {data:?} on {msg} failed: {e}");
            Some(FAILED.to_string())
        }
    };
    let mut answer = bot.answer_callback_query(cb_id);
    if let Some(text) = notice {
        answer = answer.text(text);
    }
    let _ = answer.await;
    Ok(())
}
