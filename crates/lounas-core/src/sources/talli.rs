//! Ravintola Talli's own menu page, used as a fallback for `talli`.

use async_trait::async_trait;
use tracing::{debug, error};

use crate::{
    calendar::DateOffset,
    domain::Restaurant,
    html,
    menu::{MenuEntry, MenuError},
    normalize::TextNormalizer,
    sources::{unsupported, DayContext, MenuSource, SourceDeps},
    Error, Result,
};

pub const PAGE_URL: &str =
    "https://www.xamk.fi/kampukset/mikkeli/tilat-ja-ravintolat/ravintola-talli/tallin-lounasmenu/";

/// Pick the day's paragraph under `#lounasmenu` and turn it into
/// `(date label, items)`.
///
/// The paragraph is the first one whose text starts with the first two
/// letters of the weekday (`ma`, `ti`, ...). Its first line is the day label.
pub fn parse_page(
    page: &str,
    ctx: &DayContext,
    normalizer: &TextNormalizer,
) -> Result<(String, Vec<String>)> {
    let region = html::region_from_id(page, "lounasmenu")
        .ok_or_else(|| Error::SourceParse("no #lounasmenu on page".to_string()))?;

    let prefix: String = ctx.weekday.chars().take(2).collect();
    let paragraph = html::paragraphs(region)
        .into_iter()
        .find(|p| html::text_of(p).to_lowercase().starts_with(&prefix))
        .ok_or_else(|| {
            Error::SourceParse(format!("no paragraph starting with \"{prefix}\""))
        })?;

    let mut lines = html::split_br(paragraph).into_iter();
    let date = lines
        .next()
        .map(|first| html::text_of(&first))
        .unwrap_or_default();
    let fragments: Vec<String> = lines.map(|l| html::strip_tags(&l)).collect();
    let items = normalizer.normalize(&fragments, ctx.weekday);
    if items.is_empty() {
        return Err(Error::SourceParse("day paragraph has no items".to_string()));
    }
    Ok((date, items))
}

pub struct TalliSource {
    deps: SourceDeps,
}

impl TalliSource {
    pub fn new(deps: SourceDeps) -> Self {
        Self { deps }
    }

    async fn fetch_talli(&self, offset: DateOffset) -> MenuEntry {
        let ctx = DayContext::for_offset(self.deps.clock.as_ref(), offset);
        let icon = self.deps.icons.resolve(Restaurant::Talli, None);

        let parsed = match self.deps.http.get_text(PAGE_URL, &[]).await {
            Ok(page) => parse_page(&page, &ctx, &self.deps.normalizer),
            Err(e) => Err(e),
        };
        match parsed {
            Ok((date, items)) => MenuEntry::with_items(Restaurant::Talli, items, Some(date)),
            Err(e) => {
                error!("Talli: {e}");
                MenuEntry::with_error(Restaurant::Talli, MenuError::from(&e))
            }
        }
        .icon(icon)
    }
}

#[async_trait]
impl MenuSource for TalliSource {
    fn id(&self) -> &'static str {
        "Talli"
    }

    async fn fetch(&self, restaurants: &[Restaurant], offset: DateOffset) -> Vec<MenuEntry> {
        debug!("Fetching data from xamk.fi...");
        let mut out = Vec::with_capacity(restaurants.len());
        for r in restaurants {
            if *r == Restaurant::Talli {
                out.push(self.fetch_talli(offset).await);
            } else {
                out.push(unsupported(self.id(), *r));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const PAGE: &str = r#"
<html><body>
<p>Tervetuloa Talliin!</p>
<div class="content">
  <h2 id="lounasmenu">Lounasmenu</h2>
  <p><strong>Maanantai 19.10.</strong><br>Broileripastaa 11,20 €<br>Kasvis&shy;keitto<br></p>
  <p><strong>Tiistai 20.10.</strong><br>Lihapullat<br>Perunamuusi</p>
</div>
</body></html>"#;

    fn ctx(d: u32) -> DayContext {
        DayContext::for_date(NaiveDate::from_ymd_opt(2026, 10, d).unwrap())
    }

    #[test]
    fn picks_paragraph_for_the_weekday() {
        let (date, items) = parse_page(PAGE, &ctx(19), &TextNormalizer::default()).unwrap();
        assert_eq!(date, "Maanantai 19.10.");
        assert_eq!(items, vec!["Broileripastaa", "Kasviskeitto"]);

        let (date, items) = parse_page(PAGE, &ctx(20), &TextNormalizer::default()).unwrap();
        assert_eq!(date, "Tiistai 20.10.");
        assert_eq!(items, vec!["Lihapullat", "Perunamuusi"]);
    }

    #[test]
    fn missing_day_is_a_parse_error() {
        let err = parse_page(PAGE, &ctx(21), &TextNormalizer::default()).unwrap_err();
        assert!(matches!(err, Error::SourceParse(_)));
    }

    #[test]
    fn missing_anchor_is_a_parse_error() {
        let err = parse_page("<p>Ma</p>", &ctx(19), &TextNormalizer::default()).unwrap_err();
        assert!(matches!(err, Error::SourceParse(_)));
    }
}
