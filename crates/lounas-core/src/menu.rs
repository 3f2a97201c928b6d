use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{domain::Restaurant, Error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuErrorKind {
    /// Network / HTTP failure.
    Fetch,
    /// Upstream shape changed.
    Parse,
    /// A listing exists but is for another day.
    DateMismatch,
    /// The source has no listing for this restaurant.
    NoListing,
    /// The source did not answer within its deadline.
    Timeout,
}

/// Per-restaurant failure, carried as data through to rendering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuError {
    pub kind: MenuErrorKind,
    pub message: String,
}

impl MenuError {
    pub fn new(kind: MenuErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_listing() -> Self {
        Self::new(
            MenuErrorKind::NoListing,
            "Ravintolalla ei ole voimassaolevaa lounaslistaa.",
        )
    }
}

impl fmt::Display for MenuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&Error> for MenuError {
    fn from(e: &Error) -> Self {
        let kind = match e {
            Error::SourceParse(_) | Error::Json(_) => MenuErrorKind::Parse,
            _ => MenuErrorKind::Fetch,
        };
        MenuError::new(kind, e.to_string())
    }
}

/// Exactly one of items / error, enforced by the type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuContent {
    Items(Vec<String>),
    Error(MenuError),
}

/// One restaurant's result for one date offset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub restaurant: Restaurant,
    pub is_additional: bool,
    /// Source-provided label, display only.
    pub date: Option<String>,
    pub content: MenuContent,
    pub icon_url: Option<String>,
}

impl MenuEntry {
    pub fn with_items(restaurant: Restaurant, items: Vec<String>, date: Option<String>) -> Self {
        Self {
            restaurant,
            is_additional: false,
            date,
            content: MenuContent::Items(items),
            icon_url: None,
        }
    }

    pub fn with_error(restaurant: Restaurant, error: MenuError) -> Self {
        Self {
            restaurant,
            is_additional: false,
            date: None,
            content: MenuContent::Error(error),
            icon_url: None,
        }
    }

    pub fn icon(mut self, icon_url: Option<String>) -> Self {
        self.icon_url = icon_url;
        self
    }

    pub fn items(&self) -> Option<&[String]> {
        match &self.content {
            MenuContent::Items(items) => Some(items),
            MenuContent::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&MenuError> {
        match &self.content {
            MenuContent::Items(_) => None,
            MenuContent::Error(e) => Some(e),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }

    /// Usable result: items present and non-empty.
    pub fn has_items(&self) -> bool {
        self.items().is_some_and(|items| !items.is_empty())
    }
}

/// Sort entries by restaurant key so results are deterministic.
pub fn sort_by_key(entries: &mut [MenuEntry]) {
    entries.sort_by(|a, b| a.restaurant.as_str().cmp(b.restaurant.as_str()));
}
