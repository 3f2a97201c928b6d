use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};

use crate::{
    blocks::Block,
    domain::{ChatId, MessageRef},
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls touching the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            // Vote bursts edit the same message; Telegram allows ~1 edit/s per chat.
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Book the next free slot; returns how long the caller must wait for it.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = self.next.max(now);
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// `MessagingPort` decorator spacing out outbound calls globally and per chat.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatId, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn chat_limiter(&self, chat_id: ChatId) -> Arc<Mutex<IntervalLimiter>> {
        self.per_chat
            .lock()
            .await
            .entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, chat_id: ChatId) {
        let global_wait = self.global.lock().await.reserve();
        let chat_wait = {
            let limiter = self.chat_limiter(chat_id).await;
            let mut guard = limiter.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_blocks(&self, chat_id: ChatId, blocks: &[Block]) -> Result<MessageRef> {
        self.throttle(chat_id).await;
        self.inner.send_blocks(chat_id, blocks).await
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.throttle(chat_id).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn update_blocks(&self, msg: MessageRef, blocks: &[Block]) -> Result<()> {
        self.throttle(msg.chat_id).await;
        self.inner.update_blocks(msg, blocks).await
    }

    async fn blank_message(&self, msg: MessageRef, placeholder: &str) -> Result<()> {
        self.throttle(msg.chat_id).await;
        self.inner.blank_message(msg, placeholder).await
    }

    async fn react(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.throttle(msg.chat_id).await;
        self.inner.react(msg, emoji).await
    }
}
