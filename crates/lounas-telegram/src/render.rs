//! Blocks → Telegram HTML text plus an inline keyboard.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use lounas_core::{
    blocks::{ActionButton, Block},
    domain::{Restaurant, Voter},
};

const VOTE_PREFIX: &str = "vote:";
const MORE_PREFIX: &str = "more:";
const ACTIONS_PER_ROW: usize = 2;

/// What a pressed inline button asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Vote(Restaurant),
    FetchAdditional(Restaurant),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(key) = data.strip_prefix(VOTE_PREFIX) {
            return key.parse().ok().map(CallbackAction::Vote);
        }
        if let Some(key) = data.strip_prefix(MORE_PREFIX) {
            return key.parse().ok().map(CallbackAction::FetchAdditional);
        }
        None
    }

    pub fn data(self) -> String {
        match self {
            CallbackAction::Vote(r) => format!("{VOTE_PREFIX}{}", r.as_str()),
            CallbackAction::FetchAdditional(r) => format!("{MORE_PREFIX}{}", r.as_str()),
        }
    }
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn voter_link(v: &Voter) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        v.id.0,
        escape_html(&v.name)
    )
}

pub fn render_html(blocks: &[Block]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for block in blocks {
        match block {
            Block::Header { text } => parts.push(format!("<b>{}</b>", escape_html(text))),
            Block::Section {
                title,
                lines,
                voters,
                ..
            } => {
                let mut s = format!("<b>{}</b>", escape_html(title));
                for line in lines {
                    s.push('\n');
                    s.push_str(&escape_html(line));
                }
                if !voters.is_empty() {
                    let names: Vec<String> = voters.iter().map(voter_link).collect();
                    s.push_str(&format!("\n👥 {}", names.join(", ")));
                }
                parts.push(s);
            }
            Block::Divider { .. } => parts.push("──────────".to_string()),
            Block::Actions { title, .. } | Block::Context { text: title } => {
                parts.push(format!("<i>{}</i>", escape_html(title)));
            }
        }
    }
    parts.join("\n\n")
}

/// Vote buttons one per row, then the additional-restaurant buttons.
/// `None` when the message has no buttons at all.
pub fn keyboard(blocks: &[Block]) -> Option<InlineKeyboardMarkup> {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for block in blocks {
        match block {
            Block::Section {
                title,
                vote: Some(button),
                ..
            } => rows.push(vec![InlineKeyboardButton::callback(
                format!("{} {title}", button.label),
                CallbackAction::Vote(button.option).data(),
            )]),
            Block::Actions { buttons, .. } => {
                for chunk in buttons.chunks(ACTIONS_PER_ROW) {
                    rows.push(chunk.iter().map(action_button).collect());
                }
            }
            _ => {}
        }
    }
    (!rows.is_empty()).then(|| InlineKeyboardMarkup::new(rows))
}

fn action_button(b: &ActionButton) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(
        format!("➕ {}", b.label),
        CallbackAction::FetchAdditional(b.value).data(),
    )
}

/// Placeholder shown after truncation.
pub fn placeholder_html(text: &str) -> String {
    format!("<i>{}</i>", escape_html(text))
}

#[cfg(test)]
mod tests {
    use teloxide::types::InlineKeyboardButtonKind;

    use super::*;
    use lounas_core::blocks::{VoteButton, ADDITIONAL_ANCHOR, MENU_END_ANCHOR};

    fn blocks() -> Vec<Block> {
        vec![
            Block::Header {
                text: "Lounaslistat (maanantai 19.10.)".into(),
            },
            Block::Section {
                anchor: "menu:savo".into(),
                title: "Vaiha Savo".into(),
                lines: vec!["🐔 Kana & riisi".into()],
                icon_url: None,
                vote: Some(VoteButton {
                    option: Restaurant::Savo,
                    label: "👍 2".into(),
                }),
                voters: vec![Voter::new(7, "<Anna>")],
            },
            Block::Divider {
                anchor: Some(MENU_END_ANCHOR.into()),
            },
            Block::Actions {
                anchor: ADDITIONAL_ANCHOR.into(),
                title: "Jotakin aivan muuta?".into(),
                buttons: vec![
                    ActionButton {
                        label: "Ravintola August".into(),
                        value: Restaurant::August,
                    },
                    ActionButton {
                        label: "Bistro Holvi".into(),
                        value: Restaurant::Holvi,
                    },
                    ActionButton {
                        label: "Ravintola Vino".into(),
                        value: Restaurant::Vino,
                    },
                ],
            },
        ]
    }

    fn callback_data(b: &InlineKeyboardButton) -> &str {
        match &b.kind {
            InlineKeyboardButtonKind::CallbackData(d) => d,
            other => panic!("unexpected button kind {other:?}"),
        }
    }

    #[test]
    fn html_escapes_text_and_links_voters() {
        let html = render_html(&blocks());
        assert!(html.starts_with("<b>Lounaslistat (maanantai 19.10.)</b>"));
        assert!(html.contains("🐔 Kana &amp; riisi"));
        assert!(html.contains("<a href=\"tg://user?id=7\">&lt;Anna&gt;</a>"));
        assert!(html.ends_with("<i>Jotakin aivan muuta?</i>"));
    }

    #[test]
    fn keyboard_has_vote_row_then_action_rows() {
        let kb = keyboard(&blocks()).unwrap();
        let rows = &kb.inline_keyboard;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0].text, "👍 2 Vaiha Savo");
        assert_eq!(callback_data(&rows[0][0]), "vote:savo");
        assert_eq!(rows[1].len(), 2);
        assert_eq!(callback_data(&rows[2][0]), "more:vino");
    }

    #[test]
    fn message_without_buttons_has_no_keyboard() {
        let only_header = vec![Block::Header { text: "x".into() }];
        assert!(keyboard(&only_header).is_none());
    }

    #[test]
    fn callback_data_parses_back() {
        assert_eq!(
            CallbackAction::parse("vote:lansiSavo"),
            Some(CallbackAction::Vote(Restaurant::LansiSavo))
        );
        assert_eq!(
            CallbackAction::parse("more:august"),
            Some(CallbackAction::FetchAdditional(Restaurant::August))
        );
        assert_eq!(CallbackAction::parse("vote:nowhere"), None);
        assert_eq!(CallbackAction::parse("askuser:1:2"), None);
    }
}
