//! Per-message vote ledgers and the voting state machine.

pub mod engine;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    blocks::Block,
    domain::{MessageRef, Restaurant, UserId, Voter},
    menu::MenuEntry,
};

pub use engine::{VoteDisplay, VoteOutcome, VotePolicy, VotingEngine};
pub use store::{BlocksEdit, FileLedgerStore, LedgerStore};

/// One user's vote for one option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter: Voter,
    pub option: Restaurant,
}

/// What the menu looked like when the message was sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSnapshotItem {
    pub restaurant: Restaurant,
    pub items: Option<Vec<String>>,
}

impl From<&MenuEntry> for MenuSnapshotItem {
    fn from(e: &MenuEntry) -> Self {
        Self {
            restaurant: e.restaurant,
            items: e.items().map(|items| items.to_vec()),
        }
    }
}

/// Durable vote record for one sent menu message. The sent message is always
/// `blocks` with the vote displays of `votes` applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageVoteLedger {
    pub instance_id: String,
    pub message: MessageRef,
    pub menu: Vec<MenuSnapshotItem>,
    pub blocks: Vec<Block>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub truncated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub votes: Vec<VoteRecord>,
}

impl MessageVoteLedger {
    pub fn new(
        instance_id: impl Into<String>,
        message: MessageRef,
        entries: &[MenuEntry],
        blocks: Vec<Block>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            message,
            menu: entries.iter().map(MenuSnapshotItem::from).collect(),
            blocks,
            created_at,
            truncated_at: None,
            votes: Vec::new(),
        }
    }

    pub fn count_for(&self, option: Restaurant) -> usize {
        self.votes.iter().filter(|v| v.option == option).count()
    }

    pub fn votes_of(&self, user: UserId) -> impl Iterator<Item = &VoteRecord> {
        self.votes.iter().filter(move |v| v.voter.id == user)
    }
}

/// A user pressing an upvote button.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteIntent {
    pub voter: Voter,
    pub option: Restaurant,
    pub limit_to_one: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteAction {
    Added,
    /// An existing vote was removed. Under limit-to-one this may be a vote for
    /// a different option than the one pressed; nothing is added in that case.
    Removed { option: Restaurant },
}

/// Add-or-toggle decision plus its write. Stores call this while holding the
/// ledger exclusively so the read-decide-write is atomic per ledger.
pub fn apply_intent(votes: &mut Vec<VoteRecord>, intent: &VoteIntent) -> VoteAction {
    let duplicate = votes.iter().position(|v| {
        v.voter.id == intent.voter.id && (intent.limit_to_one || v.option == intent.option)
    });

    match duplicate {
        Some(idx) => {
            let removed = votes.remove(idx);
            VoteAction::Removed {
                option: removed.option,
            }
        }
        None => {
            votes.push(VoteRecord {
                voter: intent.voter.clone(),
                option: intent.option,
            });
            VoteAction::Added
        }
    }
}

/// A message waiting to be blanked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTruncation {
    pub instance_id: String,
    pub message: MessageRef,
    pub due_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(user: i64, option: Restaurant, limit_to_one: bool) -> VoteIntent {
        VoteIntent {
            voter: Voter::new(user, format!("u{user}")),
            option,
            limit_to_one,
        }
    }

    #[test]
    fn toggle_twice_restores_original_state() {
        let mut votes = vec![VoteRecord {
            voter: Voter::new(9, "other"),
            option: Restaurant::Savo,
        }];
        let before = votes.clone();

        assert_eq!(
            apply_intent(&mut votes, &intent(1, Restaurant::Savo, false)),
            VoteAction::Added
        );
        assert_eq!(
            apply_intent(&mut votes, &intent(1, Restaurant::Savo, false)),
            VoteAction::Removed {
                option: Restaurant::Savo
            }
        );
        assert_eq!(votes, before);
    }

    #[test]
    fn without_limit_user_can_vote_many_options() {
        let mut votes = Vec::new();
        apply_intent(&mut votes, &intent(1, Restaurant::Savo, false));
        apply_intent(&mut votes, &intent(1, Restaurant::Talli, false));
        assert_eq!(votes.len(), 2);
    }

    #[test]
    fn limit_to_one_switch_collapses_to_removal() {
        let mut votes = Vec::new();
        apply_intent(&mut votes, &intent(1, Restaurant::Savo, true));
        let action = apply_intent(&mut votes, &intent(1, Restaurant::Talli, true));
        assert_eq!(
            action,
            VoteAction::Removed {
                option: Restaurant::Savo
            }
        );
        assert!(votes.is_empty());

        apply_intent(&mut votes, &intent(1, Restaurant::Talli, true));
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].option, Restaurant::Talli);
    }

    #[test]
    fn limit_to_one_keeps_at_most_one_vote_per_user() {
        let options = [
            Restaurant::Savo,
            Restaurant::Talli,
            Restaurant::Savo,
            Restaurant::August,
            Restaurant::August,
            Restaurant::Talli,
            Restaurant::Holvi,
        ];
        let mut votes = Vec::new();
        for (i, option) in options.iter().enumerate() {
            apply_intent(&mut votes, &intent(1, *option, true));
            apply_intent(&mut votes, &intent(2 + (i as i64 % 2), *option, true));
            for user in 1..=3 {
                assert!(votes.iter().filter(|v| v.voter.id == UserId(user)).count() <= 1);
            }
        }
    }
}
