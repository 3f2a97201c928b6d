//! Upstream menu sources.
//!
//! A source never fails as a whole: every problem becomes a per-restaurant
//! `MenuEntry` error so the router can fall back and the renderer can show it.

pub mod http;
pub mod mock;
pub mod ruokapaikka;
pub mod talli;
pub mod vaiha;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use crate::{
    calendar::{target_date, weekday_fi, Clock, DateOffset},
    domain::Restaurant,
    menu::{MenuEntry, MenuError},
    normalize::TextNormalizer,
};

pub use http::HttpFetcher;
pub use mock::MockSource;
pub use ruokapaikka::RuokapaikkaSource;
pub use talli::TalliSource;
pub use vaiha::VaihaSource;

#[async_trait]
pub trait MenuSource: Send + Sync {
    /// Short name for logs.
    fn id(&self) -> &'static str;

    /// One entry per requested restaurant, in request order.
    async fn fetch(&self, restaurants: &[Restaurant], offset: DateOffset) -> Vec<MenuEntry>;
}

/// What every scraper needs to know about the day being requested.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayContext {
    pub date: NaiveDate,
    pub weekday: &'static str,
}

impl DayContext {
    pub fn for_offset(clock: &dyn Clock, offset: DateOffset) -> Self {
        Self::for_date(target_date(clock, offset))
    }

    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: weekday_fi(date.weekday()),
        }
    }
}

/// Shared collaborators for the concrete sources.
#[derive(Clone)]
pub struct SourceDeps {
    pub http: Arc<HttpFetcher>,
    pub clock: Arc<dyn Clock>,
    pub normalizer: Arc<TextNormalizer>,
    pub icons: IconResolver,
}

/// Builds restaurant icon URLs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IconResolver {
    override_base: Option<String>,
}

const ICON_HOST: &str = "https://kuvat.tassa.fi";

impl IconResolver {
    pub fn new(override_base: Option<String>) -> Self {
        Self { override_base }
    }

    /// Override base wins; otherwise the upstream icon path is resolved
    /// against the image host.
    pub fn resolve(&self, restaurant: Restaurant, upstream: Option<&str>) -> Option<String> {
        if let Some(base) = &self.override_base {
            return Some(format!(
                "{}/lounas_icons/{}.png",
                base.trim_end_matches('/'),
                restaurant.as_str()
            ));
        }

        let icon = upstream.map(str::trim).filter(|s| !s.is_empty())?;
        if icon.starts_with("http://") || icon.starts_with("https://") {
            return Some(icon.to_string());
        }
        if let Some(rest) = icon.strip_prefix("//") {
            return Some(format!("https://{rest}"));
        }
        Some(format!("{ICON_HOST}/{}", icon.trim_start_matches('/')))
    }
}

/// Entries for a source that only serves one restaurant.
pub(crate) fn unsupported(source: &str, restaurant: Restaurant) -> MenuEntry {
    MenuEntry::with_error(
        restaurant,
        MenuError::new(
            crate::menu::MenuErrorKind::NoListing,
            format!("{source} does not serve {restaurant}"),
        ),
    )
}
