//! Chat-facing use cases: menu requests, votes, additional restaurants and
//! admin commands. Transport adapters call into `LunchService` only.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::{debug, info, warn};

use crate::{
    blocks::{
        apply_vote_displays, find_anchor, footer, insert_before_anchor, remove_action_button,
        section_anchor, Block, ADDITIONAL_ANCHOR, MENU_END_ANCHOR,
    },
    cache::AggregationService,
    calendar::{Clock, DateOffset},
    config::Settings,
    domain::{ChatId, MessageRef, Restaurant, UserId, Voter},
    messaging::MessagingPort,
    truncation::TruncationScheduler,
    votes::{
        engine::displays_for, BlocksEdit, LedgerStore, MessageVoteLedger, VoteAction, VotingEngine,
    },
    Error, Result,
};

const CLEAR_CACHE_COMMAND: &str = "!clearCache";
const LIMIT_VOTES_COMMAND: &str = "!limitToOne";
const ACK_EMOJI: &str = "👀";

const NOT_VOTABLE: &str = "Tätä viestiä ei voi enää äänestää.";
const NOT_ALLOWED: &str = "Sinulla ei ole oikeuksia tähän komentoon.";
const CACHE_CLEARED: &str = "OK! Cache cleared";

/// Text commands understood in chats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatCommand {
    Menu { offset: DateOffset },
    ClearCache,
    LimitToOne(bool),
}

/// Someone wrote a message in a chat.
#[derive(Clone, Debug)]
pub struct IncomingText {
    pub chat_id: ChatId,
    /// The trigger message itself, if the transport can reference it.
    pub message: Option<MessageRef>,
    pub sender: Voter,
    pub text: String,
}

pub struct LunchService {
    settings: Arc<Settings>,
    aggregation: Arc<AggregationService>,
    engine: Arc<VotingEngine>,
    store: Arc<dyn LedgerStore>,
    messenger: Arc<dyn MessagingPort>,
    truncation: TruncationScheduler,
    clock: Arc<dyn Clock>,
}

impl LunchService {
    pub fn new(
        settings: Arc<Settings>,
        aggregation: Arc<AggregationService>,
        engine: Arc<VotingEngine>,
        store: Arc<dyn LedgerStore>,
        messenger: Arc<dyn MessagingPort>,
        truncation: TruncationScheduler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            aggregation,
            engine,
            store,
            messenger,
            truncation,
            clock,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn parse(&self, text: &str) -> Option<ChatCommand> {
        let trimmed = text.trim();
        if trimmed == CLEAR_CACHE_COMMAND {
            return Some(ChatCommand::ClearCache);
        }
        if let Some(arg) = trimmed.strip_prefix(LIMIT_VOTES_COMMAND) {
            return match arg.trim() {
                "on" => Some(ChatCommand::LimitToOne(true)),
                "off" => Some(ChatCommand::LimitToOne(false)),
                _ => None,
            };
        }
        if self.settings.trigger.is_match(text) {
            let offset = if self.settings.tomorrow_trigger.is_match(text) {
                DateOffset::Tomorrow
            } else {
                DateOffset::Today
            };
            return Some(ChatCommand::Menu { offset });
        }
        None
    }

    /// Dispatch a chat message. Returns the menu message when one was sent.
    pub async fn handle_text(&self, incoming: IncomingText) -> Result<Option<MessageRef>> {
        let Some(cmd) = self.parse(&incoming.text) else {
            return Ok(None);
        };
        debug!("Command {:?} from {}", cmd, incoming.sender.id.0);

        match cmd {
            ChatCommand::Menu { offset } => {
                if let Some(trigger) = incoming.message {
                    if let Err(e) = self.messenger.react(trigger, ACK_EMOJI).await {
                        debug!("Reaction on {trigger} failed: {e}");
                    }
                }
                let msg = self
                    .request_menu(incoming.chat_id, &incoming.sender, offset)
                    .await?;
                Ok(Some(msg))
            }
            ChatCommand::ClearCache => {
                let reply = self.clear_cache(incoming.sender.id).await;
                self.messenger.send_text(incoming.chat_id, reply).await?;
                Ok(None)
            }
            ChatCommand::LimitToOne(on) => {
                let reply = self.set_limit_to_one(incoming.sender.id, on);
                self.messenger.send_text(incoming.chat_id, &reply).await?;
                Ok(None)
            }
        }
    }

    /// Aggregate, post and track a menu message.
    pub async fn request_menu(
        &self,
        chat_id: ChatId,
        requester: &Voter,
        offset: DateOffset,
    ) -> Result<MessageRef> {
        let snap = self
            .aggregation
            .get_menus(&self.settings.default_restaurants, offset)
            .await;

        let mut blocks = snap.blocks;
        blocks.push(footer(
            requester,
            &self.truncation.policy().retention_note(),
            self.announcement(),
        ));

        let msg = self.messenger.send_blocks(chat_id, &blocks).await?;
        info!("Sent menu {} ({}) to chat {}", msg, snap.date_key, chat_id.0);

        if offset == DateOffset::Today {
            let ledger = MessageVoteLedger::new(
                self.settings.instance_id.clone(),
                msg,
                &snap.data,
                blocks,
                self.clock.now().with_timezone(&Utc),
            );
            if let Err(e) = self.store.create(ledger).await {
                warn!("Could not create vote ledger for {msg}: {e}");
            }
        }

        if let Err(e) = self.truncation.schedule(msg).await {
            warn!("Could not schedule truncation of {msg}: {e}");
        }
        Ok(msg)
    }

    /// Toggle a vote and refresh the message. Returns a notice for the voter.
    pub async fn handle_vote(
        &self,
        msg: MessageRef,
        voter: Voter,
        option: Restaurant,
    ) -> Result<Option<String>> {
        let outcome = match self.engine.apply_vote(msg, voter, option).await {
            Ok(outcome) => outcome,
            Err(Error::LedgerNotFound(_)) => return Ok(Some(NOT_VOTABLE.to_string())),
            Err(Error::Persistence(e)) => {
                warn!("Vote on {msg} dropped: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let show_voters = self.engine.policy().display_voters;
        let mut blocks = outcome.ledger.blocks.clone();
        apply_vote_displays(&mut blocks, &outcome.displays, show_voters);
        self.messenger.update_blocks(msg, &blocks).await?;

        let renderer = self.aggregation.renderer();
        let notice = match outcome.action {
            VoteAction::Added => format!("Ääni annettu: {}", renderer.display_name(option)),
            VoteAction::Removed { option: removed } if removed == option => {
                format!("Ääni poistettu: {}", renderer.display_name(option))
            }
            VoteAction::Removed { option: removed } => format!(
                "Voit äänestää vain yhtä vaihtoehtoa. Aiempi äänesi ({}) poistettiin, äänestä uudelleen.",
                renderer.display_name(removed)
            ),
        };
        Ok(Some(notice))
    }

    /// Fetch an additional restaurant into an existing menu message.
    pub async fn fetch_additional(
        &self,
        msg: MessageRef,
        restaurant: Restaurant,
    ) -> Result<Option<String>> {
        if !self.settings.additional_restaurants.contains(&restaurant) {
            warn!("Ignoring request for non-additional restaurant {restaurant}");
            return Ok(None);
        }

        let anchor = section_anchor(restaurant);
        match self.store.find(msg).await {
            Ok(ledger) if ledger.truncated_at.is_some() => {
                return Ok(Some(NOT_VOTABLE.to_string()))
            }
            Ok(ledger) if find_anchor(&ledger.blocks, &anchor).is_some() => return Ok(None),
            Ok(_) => {}
            Err(Error::LedgerNotFound(_)) => return Ok(Some(NOT_VOTABLE.to_string())),
            Err(e) => return Err(e),
        }

        let entry = self
            .aggregation
            .get_additional(restaurant, DateOffset::Today)
            .await;
        let section = self.aggregation.renderer().section(&entry, true);

        // The fetch ran unlocked; the splice re-checks under the store lock.
        let splice: BlocksEdit = Box::new(move |blocks: &mut Vec<Block>| {
            if find_anchor(blocks, &anchor).is_some() {
                return Ok(false);
            }
            insert_before_anchor(blocks, MENU_END_ANCHOR, section)?;
            remove_action_button(blocks, ADDITIONAL_ANCHOR, restaurant);
            Ok(true)
        });
        let ledger = match self.store.edit_blocks(msg, splice).await {
            Ok((_, false)) => return Ok(None),
            Ok((ledger, true)) => ledger,
            Err(Error::LedgerNotFound(_)) => return Ok(Some(NOT_VOTABLE.to_string())),
            Err(e) => return Err(e),
        };

        let show_voters = self.engine.policy().display_voters;
        let mut shown = ledger.blocks.clone();
        apply_vote_displays(&mut shown, &displays_for(&ledger, show_voters), show_voters);
        self.messenger.update_blocks(msg, &shown).await?;

        info!("Added {restaurant} to {msg}");
        Ok(None)
    }

    pub async fn clear_cache(&self, user: UserId) -> &'static str {
        if !self.settings.is_admin(user.0) {
            return NOT_ALLOWED;
        }
        self.aggregation.clear_cache().await;
        CACHE_CLEARED
    }

    pub fn set_limit_to_one(&self, user: UserId, on: bool) -> String {
        if !self.settings.is_admin(user.0) {
            return NOT_ALLOWED.to_string();
        }
        self.engine.policy().set_limit_to_one(on);
        info!("limit_to_one set to {on} by {}", user.0);
        format!("limitToOne = {on}")
    }

    /// Rotates through the configured announcements, one per day.
    fn announcement(&self) -> Option<&str> {
        let list = &self.settings.announcements;
        if list.is_empty() {
            return None;
        }
        let day = self.clock.today().ordinal0() as usize;
        list.get(day % list.len()).map(String::as_str)
    }
}
