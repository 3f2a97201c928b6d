use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Chat user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

/// Message id within a chat (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i32);

/// A stable reference to a sent chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id.0, self.message_id.0)
    }
}

/// A chat user as seen by the bot: id plus the name shown in voter lists.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voter {
    pub id: UserId,
    pub name: String,
}

impl Voter {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
        }
    }
}

/// Stable venue key, independent of display name or data source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Restaurant {
    Savo,
    VaihaAsema,
    Rauha,
    Talli,
    Rami,
    RamiVisulahti,
    August,
    Holvi,
    Vino,
    Fernando,
    Pormestari,
    Lale,
    LansiSavo,
    Kotiherkku,
}

impl Restaurant {
    pub const ALL: [Restaurant; 14] = [
        Restaurant::Savo,
        Restaurant::VaihaAsema,
        Restaurant::Rauha,
        Restaurant::Talli,
        Restaurant::Rami,
        Restaurant::RamiVisulahti,
        Restaurant::August,
        Restaurant::Holvi,
        Restaurant::Vino,
        Restaurant::Fernando,
        Restaurant::Pormestari,
        Restaurant::Lale,
        Restaurant::LansiSavo,
        Restaurant::Kotiherkku,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Restaurant::Savo => "savo",
            Restaurant::VaihaAsema => "vaihaAsema",
            Restaurant::Rauha => "rauha",
            Restaurant::Talli => "talli",
            Restaurant::Rami => "rami",
            Restaurant::RamiVisulahti => "ramiVisulahti",
            Restaurant::August => "august",
            Restaurant::Holvi => "holvi",
            Restaurant::Vino => "vino",
            Restaurant::Fernando => "fernando",
            Restaurant::Pormestari => "pormestari",
            Restaurant::Lale => "lale",
            Restaurant::LansiSavo => "lansiSavo",
            Restaurant::Kotiherkku => "kotiherkku",
        }
    }

    /// Canonical venue name. Upstream listings are matched against this, so it
    /// must not be overridden by display-name settings.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Restaurant::Savo => "Vaiha Savo",
            Restaurant::VaihaAsema => "Vaiha Asema",
            Restaurant::Rauha => "Kahvila-ravintola Rauha",
            Restaurant::Talli => "Ravintola Talli",
            Restaurant::Rami => "Ramin Konditoria Sammonkatu",
            Restaurant::RamiVisulahti => "Rami Visulahti",
            Restaurant::August => "Ravintola August",
            Restaurant::Holvi => "Bistro Holvi",
            Restaurant::Vino => "Ravintola Vino",
            Restaurant::Fernando => "Ravintola Fernando",
            Restaurant::Pormestari => "Vaiha Pormestari",
            Restaurant::Lale => "Ravintola Lale",
            Restaurant::LansiSavo => "Ravintola Länsi-Savo",
            Restaurant::Kotiherkku => "Serviini Oy / Kotiherkku Ruokapuoti",
        }
    }
}

impl fmt::Display for Restaurant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Restaurant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        Restaurant::ALL
            .into_iter()
            .find(|r| r.as_str() == key)
            .ok_or_else(|| Error::Config(format!("unknown restaurant: {key}")))
    }
}
