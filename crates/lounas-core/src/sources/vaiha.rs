//! vaiha.fi news page, used as a fallback for `savo`.

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

pub const PAGE_URL: &str = "https://www.vaiha.fi/kaikki-uutiset/vaiha-lounas";

/// The day paragraph is the first `<p>` in `.news-item-single-text` whose
/// leading child reads `<weekday> ...`.
pub fn parse_page(
    page: &str,
    ctx: &DayContext,
    normalizer: &TextNormalizer,
) -> Result<(String, Vec<String>)> {
    let container = html::region_from_class(page, "news-item-single-text")
        .ok_or_else(|| Error::SourceParse("could not find news container".to_string()))?;

    let expected = format!("{} ", ctx.weekday);
    let paragraph = html::paragraphs(container)
        .into_iter()
        .find(|p| {
            html::first_child_text(p)
                .is_some_and(|t| t.to_lowercase().starts_with(&expected))
        })
        .ok_or_else(|| Error::SourceParse(format!("no paragraph for {}", ctx.weekday)))?;

    let mut lines = html::split_br(paragraph).into_iter();
    let date = lines
        .next()
        .map(|first| html::text_of(&first))
        .unwrap_or_default();
    let fragments: Vec<String> = lines.map(|l| html::strip_tags(&l)).collect();
    let items = normalizer.normalize(&fragments, ctx.weekday);
    if items.is_empty() {
        return Err(Error::SourceParse("empty items list".to_string()));
    }
    Ok((date, items))
}

pub struct VaihaSource {
    deps: SourceDeps,
}

impl VaihaSource {
    pub fn new(deps: SourceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl MenuSource for VaihaSource {
    fn id(&self) -> &'static str {
        "Vaiha"
    }

    async fn fetch(&self, restaurants: &[Restaurant], offset: DateOffset) -> Vec<MenuEntry> {
        debug!("Fetching data from vaiha.fi...");
        if !restaurants.contains(&Restaurant::Savo) {
            return restaurants.iter().map(|r| unsupported(self.id(), *r)).collect();
        }

        let ctx = DayContext::for_offset(self.deps.clock.as_ref(), offset);
        let page = self.deps.http.get_text(PAGE_URL, &[]).await;
        let savo = match page.and_then(|p| parse_page(&p, &ctx, &self.deps.normalizer)) {
            Ok((date, items)) => MenuEntry::with_items(Restaurant::Savo, items, Some(date)),
            Err(e) => {
                error!("Vaiha: {e}");
                MenuEntry::with_error(Restaurant::Savo, MenuError::from(&e))
            }
        }
        .icon(self.deps.icons.resolve(Restaurant::Savo, None));

        restaurants
            .iter()
            .map(|r| {
                if *r == Restaurant::Savo {
                    savo.clone()
                } else {
                    unsupported(self.id(), *r)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use regex::Regex;

    use super::*;

    const PAGE: &str = r#"
<div class="news-list"><p><strong>maanantai 12.10.</strong><br>Vanha lista</p></div>
<div class="news-item-single-text">
  <p>Lounas arkisin 10.30-13.30</p>
  <p><strong>Maanantai 19.10.</strong><br>Jauhelihakeitto 10,50€<br>Lounas sisältää salaattipöydän<br>Pinaattiletut</p>
  <p><strong>Tiistai 20.10.</strong><br>Kalaa</p>
</div>"#;

    fn monday() -> DayContext {
        DayContext::for_date(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap())
    }

    #[test]
    fn reads_the_day_paragraph_inside_the_container() {
        let (date, items) = parse_page(PAGE, &monday(), &TextNormalizer::default()).unwrap();
        assert_eq!(date, "Maanantai 19.10.");
        assert_eq!(
            items,
            vec![
                "Jauhelihakeitto",
                "Lounas sisältää salaattipöydän",
                "Pinaattiletut"
            ]
        );
    }

    #[test]
    fn strip_rules_drop_boilerplate_lines() {
        let n = TextNormalizer::new(vec![Regex::new("(?i)salaattipöy").unwrap()]);
        let (_, items) = parse_page(PAGE, &monday(), &n).unwrap();
        assert_eq!(items, vec!["Jauhelihakeitto", "Pinaattiletut"]);
    }

    #[test]
    fn no_paragraph_for_day_is_a_parse_error() {
        let sunday = DayContext::for_date(NaiveDate::from_ymd_opt(2026, 10, 25).unwrap());
        let err = parse_page(PAGE, &sunday, &TextNormalizer::default()).unwrap_err();
        assert!(matches!(err, Error::SourceParse(_)));
    }
}
