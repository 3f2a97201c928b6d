//! Telegram update handlers.
//!
//! Each handler is a thin adapter: filter by chat, translate the update into
//! core types, call `LunchService`, and report back to Telegram.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};

use lounas_core::domain::Voter;

use crate::router::AppState;

mod callback;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !state.cfg.settings.accepts_chat(msg.chat.id.0) {
        return Ok(());
    }
    if msg.text().is_some() {
        return text::handle_text(bot, msg, state).await;
    }
    Ok(())
}

fn voter(user: &User) -> Voter {
    Voter::new(user.id.0 as i64, user.full_name())
}
