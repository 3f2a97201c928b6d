use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    blocks::Block,
    domain::MessageRef,
    votes::{apply_intent, MessageVoteLedger, PendingTruncation, VoteAction, VoteIntent},
    Error, Result,
};

/// Ledgers older than this are dropped when new ones are created.
const LEDGER_RETENTION_DAYS: i64 = 7;

/// In-place edit of a ledger's stored blocks. Returns whether anything
/// changed.
pub type BlocksEdit = Box<dyn FnOnce(&mut Vec<Block>) -> Result<bool> + Send>;

/// Persistence port for vote ledgers and pending truncations.
///
/// Implementations must make `apply_vote` and `edit_blocks` atomic per
/// ledger: the read and the write happen without another update on the same
/// message in between. Both refuse a ledger whose message was truncated.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// `Error::LedgerNotFound` when the message has no ledger.
    async fn find(&self, msg: MessageRef) -> Result<MessageVoteLedger>;

    async fn create(&self, ledger: MessageVoteLedger) -> Result<()>;

    /// Atomic add-or-remove; returns the ledger as stored after the update.
    /// `Error::LedgerNotFound` also when the message was already truncated.
    async fn apply_vote(
        &self,
        msg: MessageRef,
        intent: &VoteIntent,
    ) -> Result<(MessageVoteLedger, VoteAction)>;

    /// Run `edit` on the stored blocks under the same guarantees as
    /// `apply_vote`. Returns the ledger after the edit and whether it changed.
    async fn edit_blocks(
        &self,
        msg: MessageRef,
        edit: BlocksEdit,
    ) -> Result<(MessageVoteLedger, bool)>;

    async fn add_pending_truncation(&self, pending: PendingTruncation) -> Result<()>;

    async fn list_pending_truncations(&self, instance_id: &str) -> Result<Vec<PendingTruncation>>;

    /// Drop the pending record without touching the message. Returns whether
    /// a record existed.
    async fn remove_pending_truncation(&self, msg: MessageRef) -> Result<bool>;

    /// The message was blanked (or is already gone): drop the pending record
    /// and stamp the ledger, if any.
    async fn mark_truncated(&self, msg: MessageRef, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    ledgers: Vec<MessageVoteLedger>,
    #[serde(default)]
    pending: Vec<PendingTruncation>,
}

#[derive(Clone, Debug, Default)]
struct StoreState {
    ledgers: HashMap<MessageRef, MessageVoteLedger>,
    pending: HashMap<MessageRef, PendingTruncation>,
}

impl StoreState {
    /// Ledger that still accepts updates.
    fn open_ledger(&mut self, msg: MessageRef) -> Result<&mut MessageVoteLedger> {
        match self.ledgers.get_mut(&msg) {
            Some(ledger) if ledger.truncated_at.is_none() => Ok(ledger),
            Some(_) => Err(Error::LedgerNotFound(format!("{msg} (truncated)"))),
            None => Err(Error::LedgerNotFound(msg.to_string())),
        }
    }

    fn to_file(&self) -> StoreFile {
        let mut ledgers: Vec<_> = self.ledgers.values().cloned().collect();
        ledgers.sort_by_key(|l| (l.created_at, l.message));
        let mut pending: Vec<_> = self.pending.values().cloned().collect();
        pending.sort_by_key(|p| (p.due_at, p.message));
        StoreFile { ledgers, pending }
    }

    fn from_file(file: StoreFile) -> Self {
        Self {
            ledgers: file
                .ledgers
                .into_iter()
                .map(|l| (l.message, l))
                .collect(),
            pending: file.pending.into_iter().map(|p| (p.message, p)).collect(),
        }
    }
}

/// JSON-file backed store. One process-wide lock serializes all mutations,
/// which is what makes vote updates atomic. With no path it is memory-only.
pub struct FileLedgerStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl FileLedgerStore {
    pub fn memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match load_store_file(&path)? {
            Some(file) => {
                info!(
                    "Loaded {} ledgers and {} pending truncations from {}",
                    file.ledgers.len(),
                    file.pending.len(),
                    path.display()
                );
                StoreState::from_file(file)
            }
            None => StoreState::default(),
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Apply `f` to a copy of the state and persist it; the live state only
    /// changes when the write succeeded.
    async fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        if let Some(path) = &self.path {
            save_store_file(path, &next.to_file())?;
        }
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn find(&self, msg: MessageRef) -> Result<MessageVoteLedger> {
        self.state
            .lock()
            .await
            .ledgers
            .get(&msg)
            .cloned()
            .ok_or_else(|| Error::LedgerNotFound(msg.to_string()))
    }

    async fn create(&self, ledger: MessageVoteLedger) -> Result<()> {
        self.mutate(|st| {
            let cutoff = ledger.created_at - Duration::days(LEDGER_RETENTION_DAYS);
            let before = st.ledgers.len();
            st.ledgers.retain(|_, l| l.created_at >= cutoff);
            let pruned = before - st.ledgers.len();
            if pruned > 0 {
                debug!("Pruned {pruned} expired ledgers");
            }
            st.ledgers.insert(ledger.message, ledger);
            Ok(())
        })
        .await
    }

    async fn apply_vote(
        &self,
        msg: MessageRef,
        intent: &VoteIntent,
    ) -> Result<(MessageVoteLedger, VoteAction)> {
        self.mutate(|st| {
            let ledger = st.open_ledger(msg)?;
            let action = apply_intent(&mut ledger.votes, intent);
            Ok((ledger.clone(), action))
        })
        .await
    }

    async fn edit_blocks(
        &self,
        msg: MessageRef,
        edit: BlocksEdit,
    ) -> Result<(MessageVoteLedger, bool)> {
        self.mutate(|st| {
            let ledger = st.open_ledger(msg)?;
            let changed = edit(&mut ledger.blocks)?;
            Ok((ledger.clone(), changed))
        })
        .await
    }

    async fn add_pending_truncation(&self, pending: PendingTruncation) -> Result<()> {
        self.mutate(|st| {
            st.pending.insert(pending.message, pending);
            Ok(())
        })
        .await
    }

    async fn list_pending_truncations(&self, instance_id: &str) -> Result<Vec<PendingTruncation>> {
        let st = self.state.lock().await;
        let mut out: Vec<_> = st
            .pending
            .values()
            .filter(|p| p.instance_id == instance_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| (p.due_at, p.message));
        Ok(out)
    }

    async fn remove_pending_truncation(&self, msg: MessageRef) -> Result<bool> {
        if !self.state.lock().await.pending.contains_key(&msg) {
            return Ok(false);
        }
        self.mutate(|st| Ok(st.pending.remove(&msg).is_some())).await
    }

    async fn mark_truncated(&self, msg: MessageRef, at: DateTime<Utc>) -> Result<()> {
        self.mutate(|st| {
            st.pending.remove(&msg);
            if let Some(ledger) = st.ledgers.get_mut(&msg) {
                ledger.truncated_at = Some(at);
            }
            Ok(())
        })
        .await
    }
}

fn load_store_file(path: &Path) -> Result<Option<StoreFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let txt = std::fs::read_to_string(path)
        .map_err(|e| Error::Persistence(format!("read {}: {e}", path.display())))?;
    if txt.trim().is_empty() {
        return Ok(None);
    }
    let file: StoreFile = serde_json::from_str(&txt)
        .map_err(|e| Error::Persistence(format!("parse {}: {e}", path.display())))?;
    Ok(Some(file))
}

/// Write to a sibling temp file, then rename over the target.
fn save_store_file(path: &Path, file: &StoreFile) -> Result<()> {
    let txt = serde_json::to_string(file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, txt)
        .map_err(|e| Error::Persistence(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::Persistence(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::{ChatId, MessageId, Restaurant, Voter};

    fn tmp_path(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        PathBuf::from(format!("/tmp/{prefix}-{}-{ts}.json", std::process::id()))
    }

    fn msg(id: i32) -> MessageRef {
        MessageRef {
            chat_id: ChatId(-100),
            message_id: MessageId(id),
        }
    }

    fn ledger(id: i32) -> MessageVoteLedger {
        MessageVoteLedger::new("test", msg(id), &[], Vec::new(), Utc::now())
    }

    fn intent(user: i64, option: Restaurant) -> VoteIntent {
        VoteIntent {
            voter: Voter::new(user, format!("u{user}")),
            option,
            limit_to_one: false,
        }
    }

    #[tokio::test]
    async fn votes_survive_reopen() {
        let path = tmp_path("lounas-store");
        {
            let store = FileLedgerStore::open(&path).unwrap();
            store.create(ledger(1)).await.unwrap();
            store
                .apply_vote(msg(1), &intent(7, Restaurant::Savo))
                .await
                .unwrap();
            store
                .add_pending_truncation(PendingTruncation {
                    instance_id: "test".into(),
                    message: msg(1),
                    due_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let reopened = FileLedgerStore::open(&path).unwrap();
        let l = reopened.find(msg(1)).await.unwrap();
        assert_eq!(l.count_for(Restaurant::Savo), 1);
        assert_eq!(reopened.list_pending_truncations("test").await.unwrap().len(), 1);
        assert!(reopened.list_pending_truncations("other").await.unwrap().is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn unknown_message_is_ledger_not_found() {
        let store = FileLedgerStore::memory();
        let err = store
            .apply_vote(msg(404), &intent(1, Restaurant::Savo))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LedgerNotFound(_)));
        assert!(matches!(
            store.find(msg(404)).await,
            Err(Error::LedgerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_votes_are_not_lost() {
        let store = Arc::new(FileLedgerStore::memory());
        store.create(ledger(1)).await.unwrap();

        let mut handles = Vec::new();
        for user in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_vote(msg(1), &intent(user, Restaurant::Talli))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let l = store.find(msg(1)).await.unwrap();
        assert_eq!(l.count_for(Restaurant::Talli), 20);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let store = FileLedgerStore {
            path: Some(PathBuf::from("/nonexistent-dir/lounas/store.json")),
            state: Mutex::new(StoreState::default()),
        };
        let err = store.create(ledger(1)).await.unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(store.find(msg(1)).await.is_err());
    }

    #[tokio::test]
    async fn mark_truncated_clears_pending_and_stamps_ledger() {
        let store = FileLedgerStore::memory();
        store.create(ledger(3)).await.unwrap();
        store
            .add_pending_truncation(PendingTruncation {
                instance_id: "test".into(),
                message: msg(3),
                due_at: Utc::now(),
            })
            .await
            .unwrap();

        store.mark_truncated(msg(3), Utc::now()).await.unwrap();
        assert!(store.list_pending_truncations("test").await.unwrap().is_empty());
        assert!(store.find(msg(3)).await.unwrap().truncated_at.is_some());
        assert!(!store.remove_pending_truncation(msg(3)).await.unwrap());
    }

    #[tokio::test]
    async fn truncated_ledger_refuses_votes_and_edits() {
        let store = FileLedgerStore::memory();
        store.create(ledger(4)).await.unwrap();
        store
            .apply_vote(msg(4), &intent(1, Restaurant::Savo))
            .await
            .unwrap();
        store.mark_truncated(msg(4), Utc::now()).await.unwrap();

        let err = store
            .apply_vote(msg(4), &intent(2, Restaurant::Savo))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LedgerNotFound(_)));

        let err = store
            .edit_blocks(
                msg(4),
                Box::new(|blocks: &mut Vec<Block>| {
                    blocks.push(Block::Divider { anchor: None });
                    Ok(true)
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LedgerNotFound(_)));

        let l = store.find(msg(4)).await.unwrap();
        assert_eq!(l.count_for(Restaurant::Savo), 1);
        assert!(l.blocks.is_empty());
    }

    #[tokio::test]
    async fn concurrent_block_edits_are_not_lost() {
        let store = Arc::new(FileLedgerStore::memory());
        store.create(ledger(5)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .edit_blocks(
                        msg(5),
                        Box::new(move |blocks: &mut Vec<Block>| {
                            blocks.push(Block::Context {
                                text: format!("edit {i}"),
                            });
                            Ok(true)
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.find(msg(5)).await.unwrap().blocks.len(), 10);
    }
}
