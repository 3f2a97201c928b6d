use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::debug;

use crate::{
    blocks::{vote_options, THUMBS_UP},
    domain::{MessageRef, Restaurant, Voter},
    votes::{store::LedgerStore, MessageVoteLedger, VoteAction, VoteIntent},
    Result,
};

/// Voting rules. `limit_to_one` can be flipped at runtime.
#[derive(Debug)]
pub struct VotePolicy {
    limit_to_one: AtomicBool,
    pub display_voters: bool,
}

impl VotePolicy {
    pub fn new(limit_to_one: bool, display_voters: bool) -> Self {
        Self {
            limit_to_one: AtomicBool::new(limit_to_one),
            display_voters,
        }
    }

    pub fn limit_to_one(&self) -> bool {
        self.limit_to_one.load(Ordering::SeqCst)
    }

    pub fn set_limit_to_one(&self, on: bool) {
        self.limit_to_one.store(on, Ordering::SeqCst);
    }
}

/// What to show for one option after a vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteDisplay {
    pub option: Restaurant,
    pub count: usize,
    /// Button label, e.g. `👍 2` (just `👍` at zero).
    pub label: String,
    /// Empty unless voter display is enabled.
    pub voters: Vec<Voter>,
}

#[derive(Clone, Debug)]
pub struct VoteOutcome {
    pub ledger: MessageVoteLedger,
    pub action: VoteAction,
    pub displays: Vec<VoteDisplay>,
}

pub struct VotingEngine {
    store: Arc<dyn LedgerStore>,
    policy: VotePolicy,
}

impl VotingEngine {
    pub fn new(store: Arc<dyn LedgerStore>, policy: VotePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &VotePolicy {
        &self.policy
    }

    /// Toggle `voter`'s vote for `option` on `msg`.
    ///
    /// Fails with `LedgerNotFound` for untracked messages and `Persistence`
    /// when the store cannot be written; the ledger is unchanged in both cases.
    pub async fn apply_vote(
        &self,
        msg: MessageRef,
        voter: Voter,
        option: Restaurant,
    ) -> Result<VoteOutcome> {
        let intent = VoteIntent {
            voter,
            option,
            limit_to_one: self.policy.limit_to_one(),
        };
        let (ledger, action) = self.store.apply_vote(msg, &intent).await?;
        debug!(
            "Vote {:?} by {} on {} for {option}",
            action, intent.voter.id.0, msg
        );

        let displays = displays_for(&ledger, self.policy.display_voters);
        Ok(VoteOutcome {
            ledger,
            action,
            displays,
        })
    }
}

/// Count label and voters for every votable option in the ledger's message.
pub fn displays_for(ledger: &MessageVoteLedger, show_voters: bool) -> Vec<VoteDisplay> {
    vote_options(&ledger.blocks)
        .into_iter()
        .map(|option| {
            let voters: Vec<Voter> = ledger
                .votes
                .iter()
                .filter(|v| v.option == option)
                .map(|v| v.voter.clone())
                .collect();
            let count = voters.len();
            VoteDisplay {
                option,
                count,
                label: count_label(count),
                voters: if show_voters { voters } else { Vec::new() },
            }
        })
        .collect()
}

pub fn count_label(count: usize) -> String {
    if count == 0 {
        THUMBS_UP.to_string()
    } else {
        format!("{THUMBS_UP} {count}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        blocks::MenuRenderer,
        calendar::DateOffset,
        domain::{ChatId, MessageId},
        menu::MenuEntry,
        votes::store::FileLedgerStore,
        Error,
    };

    fn msg() -> MessageRef {
        MessageRef {
            chat_id: ChatId(1),
            message_id: MessageId(10),
        }
    }

    async fn engine_with_ledger(limit_to_one: bool) -> VotingEngine {
        let entries = vec![
            MenuEntry::with_items(Restaurant::Savo, vec!["Keitto".into()], None),
            MenuEntry::with_items(Restaurant::Talli, vec!["Pasta".into()], None),
        ];
        let blocks = MenuRenderer::default().render(&entries, DateOffset::Today, None);
        let store = Arc::new(FileLedgerStore::memory());
        store
            .create(MessageVoteLedger::new("t", msg(), &entries, blocks, Utc::now()))
            .await
            .unwrap();
        VotingEngine::new(store, VotePolicy::new(limit_to_one, true))
    }

    fn count(outcome: &VoteOutcome, option: Restaurant) -> usize {
        outcome
            .displays
            .iter()
            .find(|d| d.option == option)
            .map(|d| d.count)
            .unwrap()
    }

    #[tokio::test]
    async fn two_users_then_one_retracts() {
        let engine = engine_with_ledger(false).await;
        let a = Voter::new(1, "A");
        let b = Voter::new(2, "B");

        engine.apply_vote(msg(), a.clone(), Restaurant::Savo).await.unwrap();
        let out = engine.apply_vote(msg(), b, Restaurant::Savo).await.unwrap();
        assert_eq!(count(&out, Restaurant::Savo), 2);
        assert_eq!(out.displays[0].label, "👍 2");
        assert_eq!(out.displays[0].voters.len(), 2);

        let out = engine.apply_vote(msg(), a, Restaurant::Savo).await.unwrap();
        assert_eq!(count(&out, Restaurant::Savo), 1);
        assert_eq!(
            out.action,
            VoteAction::Removed {
                option: Restaurant::Savo
            }
        );
        assert_eq!(count(&out, Restaurant::Talli), 0);
        assert_eq!(out.displays[1].label, "👍");
    }

    #[tokio::test]
    async fn runtime_policy_toggle_applies_to_next_vote() {
        let engine = engine_with_ledger(false).await;
        let a = Voter::new(1, "A");

        engine.apply_vote(msg(), a.clone(), Restaurant::Savo).await.unwrap();
        engine.policy().set_limit_to_one(true);
        let out = engine.apply_vote(msg(), a, Restaurant::Talli).await.unwrap();

        assert_eq!(
            out.action,
            VoteAction::Removed {
                option: Restaurant::Savo
            }
        );
        assert!(out.ledger.votes.is_empty());
    }

    #[tokio::test]
    async fn voters_hidden_when_display_disabled() {
        let store = Arc::new(FileLedgerStore::memory());
        let entries = vec![MenuEntry::with_items(Restaurant::Savo, vec!["x".into()], None)];
        let blocks = MenuRenderer::default().render(&entries, DateOffset::Today, None);
        store
            .create(MessageVoteLedger::new("t", msg(), &entries, blocks, Utc::now()))
            .await
            .unwrap();
        let engine = VotingEngine::new(store, VotePolicy::new(false, false));

        let out = engine
            .apply_vote(msg(), Voter::new(1, "A"), Restaurant::Savo)
            .await
            .unwrap();
        assert_eq!(out.displays[0].count, 1);
        assert!(out.displays[0].voters.is_empty());
    }

    #[tokio::test]
    async fn untracked_message_is_not_found() {
        let engine = VotingEngine::new(
            Arc::new(FileLedgerStore::memory()),
            VotePolicy::new(false, true),
        );
        let err = engine
            .apply_vote(msg(), Voter::new(1, "A"), Restaurant::Savo)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LedgerNotFound(_)));
    }
}
