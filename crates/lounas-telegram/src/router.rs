use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use lounas_core::{config::Config, messaging::MessagingPort, runtime, service::LunchService};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<LunchService>,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        info!("lounas started: @{}", me.username());
    }
    info!(
        "Instance {} serving {} default restaurant(s)",
        cfg.settings.instance_id,
        cfg.settings.default_restaurants.len()
    );

    // The core wraps this in its throttling decorator; RetryAfter is still
    // retried once here.
    let transport: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let rt = runtime::start(cfg.clone(), transport).await?;

    let state = Arc::new(AppState {
        cfg,
        service: rt.service.clone(),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    rt.shutdown().await;
    Ok(())
}
