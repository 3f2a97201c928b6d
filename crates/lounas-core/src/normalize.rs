//! Menu text cleanup applied to every accepted listing.

use std::sync::OnceLock;

use regex::Regex;

use crate::html;

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,2}(?:[,.]\d{2})?\s*€").expect("valid regex"))
}

/// Turns raw scraped fragments into clean menu lines.
///
/// Pipeline, in order: split on `<br>`, trim, decode entities, drop the bare
/// weekday line, strip weekday prefixes, drop strip-rule lines, strip price
/// tokens, drop empty lines. The pipeline is re-run until its output stops
/// changing, so `normalize(normalize(x)) == normalize(x)`.
#[derive(Clone, Debug, Default)]
pub struct TextNormalizer {
    strip_rules: Vec<Regex>,
}

impl TextNormalizer {
    /// `strip_rules` are expected to be compiled case-insensitive already.
    pub fn new(strip_rules: Vec<Regex>) -> Self {
        Self { strip_rules }
    }

    pub fn strip_rules(&self) -> &[Regex] {
        &self.strip_rules
    }

    pub fn normalize<S: AsRef<str>>(&self, fragments: &[S], weekday: &str) -> Vec<String> {
        let weekday = WeekdayPatterns::new(weekday);
        let mut current: Vec<String> = fragments.iter().map(|s| s.as_ref().to_string()).collect();

        // Every changing pass drops a line or shortens one, so this settles.
        loop {
            let next = self.pass(&current, &weekday);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn pass(&self, lines: &[String], weekday: &WeekdayPatterns) -> Vec<String> {
        lines
            .iter()
            .flat_map(|line| html::split_br(line))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(|s| html::decode_entities(&s))
            .filter(|s| !weekday.is_bare_label(s))
            .map(|s| weekday.strip_prefixes(&s).trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| !self.strip_rules.iter().any(|rule| rule.is_match(s)))
            .map(|s| price_re().replace_all(&s, "").trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

struct WeekdayPatterns {
    bare: Option<Regex>,
    prefix: Option<Regex>,
}

impl WeekdayPatterns {
    fn new(weekday: &str) -> Self {
        let weekday = weekday.trim();
        if weekday.is_empty() {
            return Self {
                bare: None,
                prefix: None,
            };
        }
        let escaped = regex::escape(weekday);
        Self {
            bare: Regex::new(&format!(r"(?i)^{escaped}\s*(?:\.|[0-9])*$")).ok(),
            prefix: Regex::new(&format!(r"(?i){escaped}:?")).ok(),
        }
    }

    fn is_bare_label(&self, s: &str) -> bool {
        self.bare.as_ref().is_some_and(|re| re.is_match(s))
    }

    fn strip_prefixes(&self, s: &str) -> String {
        match &self.prefix {
            Some(re) => re.replace_all(s, "").into_owned(),
            None => s.to_string(),
        }
    }
}
