//! ruokapaikka.fi lunch API (JSON, many restaurants per request).

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error};

use crate::{
    calendar::{short_date, DateOffset},
    config::LatLon,
    domain::Restaurant,
    html,
    menu::{MenuEntry, MenuError, MenuErrorKind},
    normalize::TextNormalizer,
    sources::{DayContext, IconResolver, MenuSource, SourceDeps},
};

pub const BASE_URL: &str = "https://www.ruokapaikka.fi/resources/lunch/pois";

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Lounas\s(\d{1,2})\.(\d{1,2})\.").expect("valid regex"))
}

fn extra_spaces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{5,}").expect("valid regex"))
}

#[derive(Debug, Default, Deserialize)]
pub struct PoiResponse {
    #[serde(default)]
    pub items: Option<Vec<PoiItem>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PoiItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub hricon: Option<String>,
    #[serde(default)]
    pub ads: Vec<PoiAdWrapper>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PoiAdWrapper {
    #[serde(default)]
    pub ad: Option<PoiAd>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoiAd {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub lunch_menu: Option<Vec<LunchMenuItem>>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LunchMenuItem {
    #[serde(default)]
    pub food: Option<String>,
}

/// The lunch advertisement picked for one venue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub icon: Option<String>,
    pub header: String,
    pub lunch_menu: Option<Vec<String>>,
    pub body: Option<String>,
}

/// One listing per venue that has an ad whose header looks like `Lounas d.m.`
pub fn extract_listings(resp: PoiResponse) -> Vec<Listing> {
    resp.items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let ad = item.ads.into_iter().filter_map(|w| w.ad).find(|ad| {
                ad.header
                    .as_deref()
                    .is_some_and(|h| header_re().is_match(h))
            })?;
            Some(Listing {
                name: item.name.unwrap_or_default(),
                icon: item.icon.filter(|s| !s.is_empty()).or(item.hricon),
                header: ad.header.unwrap_or_default(),
                lunch_menu: ad
                    .lunch_menu
                    .map(|m| m.into_iter().filter_map(|i| i.food).collect()),
                body: ad.body,
            })
        })
        .collect()
}

/// Whether `header` is dated for `ctx.date` (day and month compared numerically).
pub fn header_matches_day(header: &str, ctx: &DayContext) -> bool {
    use chrono::Datelike;
    header_re().captures_iter(header).any(|c| {
        let day = c[1].parse::<u32>().ok();
        let month = c[2].parse::<u32>().ok();
        day == Some(ctx.date.day()) && month == Some(ctx.date.month())
    })
}

/// Build the entry for one restaurant out of the fetched listings.
pub fn build_entry(
    restaurant: Restaurant,
    listings: &[Listing],
    ctx: &DayContext,
    normalizer: &TextNormalizer,
    icons: &IconResolver,
) -> MenuEntry {
    let Some(listing) = listings
        .iter()
        .find(|l| l.name == restaurant.canonical_name())
    else {
        return MenuEntry::with_error(restaurant, MenuError::no_listing());
    };

    let icon_url = icons.resolve(restaurant, listing.icon.as_deref());

    if !header_matches_day(&listing.header, ctx) {
        return MenuEntry::with_error(
            restaurant,
            MenuError::new(
                MenuErrorKind::DateMismatch,
                format!(
                    "Requested {} but the listing is for \"{}\"",
                    short_date(ctx.date),
                    listing.header
                ),
            ),
        )
        .icon(icon_url);
    }

    let fragments: Vec<String> = if let Some(menu) = &listing.lunch_menu {
        menu.iter().map(|s| html::strip_tags(s)).collect()
    } else if let Some(body) = &listing.body {
        let body = if matches!(restaurant, Restaurant::Rami | Restaurant::LansiSavo) {
            let first = body.split("<br><br>").next().unwrap_or_default();
            extra_spaces_re().replace_all(first, "<br>").into_owned()
        } else {
            body.clone()
        };
        html::split_br(&body)
            .iter()
            .map(|s| html::strip_tags(s))
            .collect()
    } else {
        return MenuEntry::with_error(
            restaurant,
            MenuError::new(
                MenuErrorKind::Parse,
                "Listing is missing both lunchMenu and body",
            ),
        )
        .icon(icon_url);
    };

    let items = normalizer.normalize(&fragments, ctx.weekday);
    let date = listing.header.replacen("Lounas", ctx.weekday, 1).trim().to_string();
    MenuEntry::with_items(restaurant, items, Some(date)).icon(icon_url)
}

pub struct RuokapaikkaSource {
    deps: SourceDeps,
    lat_lon: LatLon,
    base_url: String,
}

impl RuokapaikkaSource {
    pub fn new(deps: SourceDeps, lat_lon: LatLon) -> Self {
        Self {
            deps,
            lat_lon,
            base_url: BASE_URL.to_string(),
        }
    }

    fn query(&self, ctx: &DayContext) -> Vec<(&'static str, String)> {
        // The API wants a timestamp inside the requested day; 09:00 UTC is safe.
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
        let ts = Utc
            .from_utc_datetime(&ctx.date.and_time(nine))
            .timestamp_millis();
        vec![
            ("lat", self.lat_lon.lat.to_string()),
            ("lon", self.lat_lon.lon.to_string()),
            ("maxdist", "10000".to_string()),
            ("page", "0".to_string()),
            ("size", "100".to_string()),
            ("l", "fi".to_string()),
            ("ts", ts.to_string()),
            ("channel", "collections_ruokapaikka".to_string()),
        ]
    }
}

#[async_trait]
impl MenuSource for RuokapaikkaSource {
    fn id(&self) -> &'static str {
        "RuokapaikkaFi"
    }

    async fn fetch(&self, restaurants: &[Restaurant], offset: DateOffset) -> Vec<MenuEntry> {
        debug!("Fetching data from ruokapaikka.fi...");
        let ctx = DayContext::for_offset(self.deps.clock.as_ref(), offset);

        let resp: PoiResponse = match self
            .deps
            .http
            .get_json(&self.base_url, &self.query(&ctx))
            .await
        {
            Ok(v) => v,
            Err(e) => {
                error!("ruokapaikka.fi request failed: {e}");
                let err = MenuError::from(&e);
                return restaurants
                    .iter()
                    .map(|r| MenuEntry::with_error(*r, err.clone()))
                    .collect();
            }
        };

        let listings = extract_listings(resp);
        restaurants
            .iter()
            .map(|r| {
                build_entry(
                    *r,
                    &listings,
                    &ctx,
                    &self.deps.normalizer,
                    &self.deps.icons,
                )
            })
            .collect()
    }
}
