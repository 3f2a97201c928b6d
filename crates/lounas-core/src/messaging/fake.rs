use std::sync::{
    atomic::{AtomicI32, Ordering},
    Mutex,
};

use async_trait::async_trait;

use crate::{
    blocks::Block,
    domain::{ChatId, MessageId, MessageRef},
    messaging::MessagingPort,
    Error, Result,
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Sent {
    Blocks(MessageRef, Vec<Block>),
    Text(MessageRef, String),
    Update(MessageRef, Vec<Block>),
    Blank(MessageRef, String),
    React(MessageRef, String),
}

/// In-memory transport that records every call.
#[derive(Debug, Default)]
pub(crate) struct FakeMessenger {
    next_id: AtomicI32,
    pub log: Mutex<Vec<Sent>>,
    /// Messages that `blank_message` reports as already deleted.
    pub gone: Mutex<Vec<MessageRef>>,
    /// When set, `blank_message` fails with a transport error.
    pub fail_blank: Mutex<bool>,
}

impl FakeMessenger {
    pub fn log(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    pub fn blanked(&self) -> Vec<MessageRef> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Blank(m, _) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(MessageRef, Vec<Block>)> {
        self.log()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Update(m, b) => Some((m, b)),
                _ => None,
            })
            .collect()
    }

    fn next(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_blocks(&self, chat_id: ChatId, blocks: &[Block]) -> Result<MessageRef> {
        let msg = self.next(chat_id);
        self.log
            .lock()
            .unwrap()
            .push(Sent::Blocks(msg, blocks.to_vec()));
        Ok(msg)
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self.next(chat_id);
        self.log
            .lock()
            .unwrap()
            .push(Sent::Text(msg, text.to_string()));
        Ok(msg)
    }

    async fn update_blocks(&self, msg: MessageRef, blocks: &[Block]) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Sent::Update(msg, blocks.to_vec()));
        Ok(())
    }

    async fn blank_message(&self, msg: MessageRef, placeholder: &str) -> Result<()> {
        if *self.fail_blank.lock().unwrap() {
            return Err(Error::External("transport down".into()));
        }
        if self.gone.lock().unwrap().contains(&msg) {
            return Err(Error::MessageNotFound(msg.to_string()));
        }
        self.log
            .lock()
            .unwrap()
            .push(Sent::Blank(msg, placeholder.to_string()));
        Ok(())
    }

    async fn react(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(Sent::React(msg, emoji.to_string()));
        Ok(())
    }
}
