//! Transport-neutral message model and the menu renderer.
//!
//! Blocks carry stable anchors (`menu:<key>`, `menu-end`, `additional`) so a
//! sent message can be patched by id instead of by position.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    calendar::DateOffset,
    config::Settings,
    domain::{Restaurant, Voter},
    menu::{MenuContent, MenuEntry},
    votes::VoteDisplay,
    Error, Result,
};

pub const MENU_END_ANCHOR: &str = "menu-end";
pub const ADDITIONAL_ANCHOR: &str = "additional";
pub const THUMBS_UP: &str = "👍";

const DEFAULT_ITEM_EMOJI: &str = "▪️";
const ADDITIONAL_PROMPT: &str = "Jotakin aivan muuta? Napsauta hakeaksesi";

pub fn section_anchor(restaurant: Restaurant) -> String {
    format!("menu:{}", restaurant.as_str())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: String,
    },
    Section {
        anchor: String,
        title: String,
        lines: Vec<String>,
        icon_url: Option<String>,
        vote: Option<VoteButton>,
        #[serde(default)]
        voters: Vec<Voter>,
    },
    Divider {
        anchor: Option<String>,
    },
    Actions {
        anchor: String,
        title: String,
        buttons: Vec<ActionButton>,
    },
    Context {
        text: String,
    },
}

impl Block {
    pub fn anchor(&self) -> Option<&str> {
        match self {
            Block::Section { anchor, .. } | Block::Actions { anchor, .. } => Some(anchor),
            Block::Divider { anchor } => anchor.as_deref(),
            Block::Header { .. } | Block::Context { .. } => None,
        }
    }
}

/// Upvote button attached to a section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteButton {
    pub option: Restaurant,
    pub label: String,
}

/// "Fetch this restaurant too" button in the additional-restaurants prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub value: Restaurant,
}

/// Builds blocks from menu entries using the display settings.
#[derive(Clone, Debug, Default)]
pub struct MenuRenderer {
    display_names: HashMap<Restaurant, String>,
    error_messages: HashMap<Restaurant, String>,
    emoji_rules: Vec<(Regex, String)>,
    icons_enabled: bool,
    additional: Vec<Restaurant>,
}

impl MenuRenderer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            display_names: settings.restaurant_display_names.clone(),
            error_messages: settings.custom_error_messages.clone(),
            emoji_rules: settings.emoji_rules.clone(),
            icons_enabled: settings.icons_enabled,
            additional: settings.additional_restaurants.clone(),
        }
    }

    pub fn with_additional(mut self, additional: Vec<Restaurant>) -> Self {
        self.additional = additional;
        self
    }

    pub fn display_name(&self, restaurant: Restaurant) -> String {
        self.display_names
            .get(&restaurant)
            .cloned()
            .unwrap_or_else(|| restaurant.canonical_name().to_string())
    }

    pub fn emoji_for(&self, item: &str) -> &str {
        self.emoji_rules
            .iter()
            .find(|(re, _)| re.is_match(item))
            .map(|(_, emoji)| emoji.as_str())
            .unwrap_or(DEFAULT_ITEM_EMOJI)
    }

    /// `Lounaslistat (<first date label>) <weather>`
    pub fn header_text(entries: &[MenuEntry], weather: Option<&str>) -> String {
        let mut header = "Lounaslistat".to_string();
        if let Some(date) = entries.iter().find_map(|e| e.date.as_deref()) {
            header.push_str(&format!(" ({date})"));
        }
        if let Some(w) = weather.map(str::trim).filter(|w| !w.is_empty()) {
            header.push(' ');
            header.push_str(w);
        }
        header
    }

    /// One section per entry. Only entries with items get a vote button.
    pub fn section(&self, entry: &MenuEntry, votable: bool) -> Block {
        let lines = match &entry.content {
            MenuContent::Items(items) => items
                .iter()
                .map(|item| format!("{} {item}", self.emoji_for(item)))
                .collect(),
            MenuContent::Error(e) => {
                let msg = self
                    .error_messages
                    .get(&entry.restaurant)
                    .cloned()
                    .unwrap_or_else(|| e.message.clone());
                vec![format!("⚠️ {msg}")]
            }
        };

        let vote = (votable && entry.items().is_some()).then(|| VoteButton {
            option: entry.restaurant,
            label: THUMBS_UP.to_string(),
        });

        Block::Section {
            anchor: section_anchor(entry.restaurant),
            title: self.display_name(entry.restaurant),
            lines,
            icon_url: entry.icon_url.clone().filter(|_| self.icons_enabled),
            vote,
            voters: Vec::new(),
        }
    }

    /// Full message body, without the per-request footer.
    pub fn render(
        &self,
        entries: &[MenuEntry],
        offset: DateOffset,
        weather: Option<&str>,
    ) -> Vec<Block> {
        let votable = offset == DateOffset::Today;
        let mut blocks = vec![Block::Header {
            text: Self::header_text(entries, weather),
        }];

        blocks.extend(
            entries
                .iter()
                .filter(|e| !e.is_additional)
                .map(|e| self.section(e, votable)),
        );
        blocks.push(Block::Divider {
            anchor: Some(MENU_END_ANCHOR.to_string()),
        });

        let present: Vec<Restaurant> = entries.iter().map(|e| e.restaurant).collect();
        let buttons: Vec<ActionButton> = self
            .additional
            .iter()
            .filter(|r| !present.contains(r))
            .map(|r| ActionButton {
                label: self.display_name(*r),
                value: *r,
            })
            .collect();
        if votable && !buttons.is_empty() {
            blocks.push(Block::Actions {
                anchor: ADDITIONAL_ANCHOR.to_string(),
                title: ADDITIONAL_PROMPT.to_string(),
                buttons,
            });
        }

        blocks
    }
}

/// Per-request footer shown under the menu.
pub fn footer(requester: &Voter, retention_note: &str, announcement: Option<&str>) -> Block {
    let mut text = format!(
        "⏰ {retention_note}\n🤖 Pyynnön lähetti {}",
        requester.name
    );
    if let Some(a) = announcement {
        text.push_str(&format!("\n📣 {a}"));
    }
    Block::Context { text }
}

/// Write vote counts (and optionally voters) into the matching sections.
pub fn apply_vote_displays(blocks: &mut [Block], displays: &[VoteDisplay], show_voters: bool) {
    for block in blocks.iter_mut() {
        let Block::Section {
            vote: Some(button),
            voters,
            ..
        } = block
        else {
            continue;
        };

        match displays.iter().find(|d| d.option == button.option) {
            Some(d) => {
                button.label = d.label.clone();
                *voters = if show_voters {
                    d.voters.clone()
                } else {
                    Vec::new()
                };
            }
            None => {
                button.label = THUMBS_UP.to_string();
                voters.clear();
            }
        }
    }
}

pub fn find_anchor(blocks: &[Block], anchor: &str) -> Option<usize> {
    blocks.iter().position(|b| b.anchor() == Some(anchor))
}

/// Insert `block` right before the block carrying `anchor`.
pub fn insert_before_anchor(blocks: &mut Vec<Block>, anchor: &str, block: Block) -> Result<()> {
    let idx = find_anchor(blocks, anchor)
        .ok_or_else(|| Error::External(format!("anchor {anchor:?} not found in message")))?;
    blocks.insert(idx, block);
    Ok(())
}

/// Drop the button for `value` from the actions block; drop the whole block
/// once it has no buttons left.
pub fn remove_action_button(blocks: &mut Vec<Block>, anchor: &str, value: Restaurant) {
    let Some(idx) = find_anchor(blocks, anchor) else {
        return;
    };
    let now_empty = match &mut blocks[idx] {
        Block::Actions { buttons, .. } => {
            buttons.retain(|b| b.value != value);
            buttons.is_empty()
        }
        _ => false,
    };
    if now_empty {
        blocks.remove(idx);
    }
}

/// Options that can be voted on in a message, in display order.
pub fn vote_options(blocks: &[Block]) -> Vec<Restaurant> {
    blocks
        .iter()
        .filter_map(|b| match b {
            Block::Section {
                vote: Some(button), ..
            } => Some(button.option),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MenuError;

    fn renderer() -> MenuRenderer {
        MenuRenderer {
            emoji_rules: vec![(Regex::new("(?i)kana").unwrap(), "🐔".to_string())],
            error_messages: HashMap::from([(Restaurant::Holvi, "Suljettu".to_string())]),
            ..MenuRenderer::default()
        }
        .with_additional(vec![Restaurant::August, Restaurant::Vino])
    }

    fn entries() -> Vec<MenuEntry> {
        vec![
            MenuEntry::with_items(
                Restaurant::Savo,
                vec!["Kanaa".into(), "Keitto".into()],
                Some("maanantai 19.10.".into()),
            ),
            MenuEntry::with_error(Restaurant::Talli, MenuError::no_listing()),
        ]
    }

    #[test]
    fn render_builds_anchored_layout() {
        let blocks = renderer().render(&entries(), DateOffset::Today, Some("☀️ 12 °C"));
        assert_eq!(
            blocks[0],
            Block::Header {
                text: "Lounaslistat (maanantai 19.10.) ☀️ 12 °C".into()
            }
        );
        assert_eq!(blocks[1].anchor(), Some("menu:savo"));
        assert_eq!(blocks[2].anchor(), Some("menu:talli"));
        assert_eq!(blocks[3].anchor(), Some(MENU_END_ANCHOR));
        assert_eq!(blocks[4].anchor(), Some(ADDITIONAL_ANCHOR));
        assert_eq!(vote_options(&blocks), vec![Restaurant::Savo]);

        let Block::Section { lines, .. } = &blocks[1] else {
            panic!("expected section");
        };
        assert_eq!(lines[0], "🐔 Kanaa");
        assert_eq!(lines[1], format!("{DEFAULT_ITEM_EMOJI} Keitto"));
    }

    #[test]
    fn tomorrow_has_no_votes_and_no_additional_prompt() {
        let blocks = renderer().render(&entries(), DateOffset::Tomorrow, None);
        assert!(vote_options(&blocks).is_empty());
        assert!(find_anchor(&blocks, ADDITIONAL_ANCHOR).is_none());
    }

    #[test]
    fn custom_error_message_overrides_source_error() {
        let entry = MenuEntry::with_error(Restaurant::Holvi, MenuError::no_listing());
        let Block::Section { lines, vote, .. } = renderer().section(&entry, true) else {
            panic!("expected section");
        };
        assert_eq!(lines, vec!["⚠️ Suljettu".to_string()]);
        assert!(vote.is_none());
    }

    #[test]
    fn additional_section_splices_before_menu_end_and_button_goes_away() {
        let r = renderer();
        let mut blocks = r.render(&entries(), DateOffset::Today, None);
        let extra = MenuEntry::with_items(Restaurant::August, vec!["Pasta".into()], None);

        insert_before_anchor(&mut blocks, MENU_END_ANCHOR, r.section(&extra, true)).unwrap();
        remove_action_button(&mut blocks, ADDITIONAL_ANCHOR, Restaurant::August);

        assert_eq!(blocks[3].anchor(), Some("menu:august"));
        let Some(Block::Actions { buttons, .. }) =
            find_anchor(&blocks, ADDITIONAL_ANCHOR).map(|i| &blocks[i])
        else {
            panic!("actions block should remain");
        };
        assert_eq!(buttons.len(), 1);

        remove_action_button(&mut blocks, ADDITIONAL_ANCHOR, Restaurant::Vino);
        assert!(find_anchor(&blocks, ADDITIONAL_ANCHOR).is_none());
    }

    #[test]
    fn vote_displays_are_applied_by_option() {
        let mut blocks = renderer().render(&entries(), DateOffset::Today, None);
        let displays = vec![VoteDisplay {
            option: Restaurant::Savo,
            count: 2,
            label: "👍 2".into(),
            voters: vec![Voter::new(1, "A"), Voter::new(2, "B")],
        }];

        apply_vote_displays(&mut blocks, &displays, true);
        let Block::Section { vote, voters, .. } = &blocks[1] else {
            panic!("expected section");
        };
        assert_eq!(vote.as_ref().unwrap().label, "👍 2");
        assert_eq!(voters.len(), 2);

        apply_vote_displays(&mut blocks, &[], true);
        let Block::Section { vote, voters, .. } = &blocks[1] else {
            panic!("expected section");
        };
        assert_eq!(vote.as_ref().unwrap().label, THUMBS_UP);
        assert!(voters.is_empty());
    }
}
