//! Minimal HTML helpers for scraping menu pages.
//!
//! Upstream pages are treated as unstable text: we locate a region by a
//! marker, then pick paragraphs out of it with regexes. Nothing here tries to
//! be a full HTML parser.

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn br_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("valid regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,10});").expect("valid regex"))
}

fn open_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*<([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").expect("valid regex"))
}

/// Split on `<br>`, `<br/>` and `<br />` (any case).
pub fn split_br(input: &str) -> Vec<String> {
    br_re().split(input).map(|s| s.to_string()).collect()
}

pub fn contains_br(input: &str) -> bool {
    br_re().is_match(input)
}

pub fn strip_tags(input: &str) -> String {
    tag_re().replace_all(input, "").into_owned()
}

/// Text content of an HTML fragment: tags removed, entities decoded, trimmed.
pub fn text_of(fragment: &str) -> String {
    decode_entities(&strip_tags(fragment)).trim().to_string()
}

/// Inner HTML of every `<p>` element, in document order.
pub fn paragraphs(html: &str) -> Vec<&str> {
    paragraph_re()
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// The document from the element carrying `id="<id>"` onward.
pub fn region_from_id<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let needle_dq = format!("id=\"{id}\"");
    let needle_sq = format!("id='{id}'");
    let at = html.find(&needle_dq).or_else(|| html.find(&needle_sq))?;
    let start = html[..at].rfind('<').unwrap_or(at);
    Some(&html[start..])
}

/// The document from the first element whose class list contains `class` onward.
pub fn region_from_class<'a>(html: &'a str, class: &str) -> Option<&'a str> {
    let re = Regex::new(&format!(
        r#"class\s*=\s*["'](?:[^"']*\s)?{}(?:\s[^"']*)?["']"#,
        regex::escape(class)
    ))
    .ok()?;
    let at = re.find(html)?.start();
    let start = html[..at].rfind('<').unwrap_or(at);
    Some(&html[start..])
}

/// Text of the first child element of a fragment, if the fragment starts with one.
pub fn first_child_text(fragment: &str) -> Option<String> {
    let caps = open_tag_re().captures(fragment)?;
    let whole = caps.get(0)?;
    let tag = caps.get(1)?.as_str().to_ascii_lowercase();
    let rest = &fragment[whole.end()..];
    let close = format!("</{tag}");
    let end = rest.to_ascii_lowercase().find(&close).unwrap_or(rest.len());
    Some(text_of(&rest[..end]))
}

/// Decode HTML character references in one pass (`&amp;lt;` becomes `&lt;`).
///
/// Unknown named entities are left untouched.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    entity_re()
        .replace_all(input, |caps: &Captures<'_>| {
            let body = &caps[1];
            decode_one(body).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_one(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse::<u32>().ok()?
        };
        return char::from_u32(code).map(|c| c.to_string());
    }

    let s = match body {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "shy" => "",
        "auml" => "ä",
        "Auml" => "Ä",
        "ouml" => "ö",
        "Ouml" => "Ö",
        "aring" => "å",
        "Aring" => "Å",
        "uuml" => "ü",
        "Uuml" => "Ü",
        "eacute" => "é",
        "Eacute" => "É",
        "egrave" => "è",
        "agrave" => "à",
        "ccedil" => "ç",
        "euro" => "€",
        "ndash" => "–",
        "mdash" => "—",
        "hellip" => "…",
        "bull" => "•",
        "middot" => "·",
        "deg" => "°",
        "frac12" => "½",
        "rsquo" => "’",
        "lsquo" => "‘",
        "rdquo" => "”",
        "ldquo" => "“",
        _ => return None,
    };
    Some(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_br_handles_all_spellings() {
        let parts = split_br("a<br>b<BR/>c<br />d");
        assert_eq!(parts, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn decode_entities_is_single_pass() {
        assert_eq!(decode_entities("Kana &amp; riisi"), "Kana & riisi");
        assert_eq!(decode_entities("P&auml;&auml;ruoka"), "Pääruoka");
        assert_eq!(decode_entities("&#228;&#xE4;"), "ää");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&bogus; & x"), "&bogus; & x");
    }

    #[test]
    fn paragraphs_and_regions() {
        let html = r#"<div><p>intro</p><h2 id="lounasmenu">Menu</h2><p class="x">Ma<br>Keitto</p></div>"#;
        let region = region_from_id(html, "lounasmenu").unwrap();
        assert!(region.starts_with("<h2"));
        assert_eq!(paragraphs(region), vec!["Ma<br>Keitto"]);
        assert_eq!(paragraphs(html).len(), 2);
    }

    #[test]
    fn region_from_class_matches_within_class_list() {
        let html = r#"<section><div class="a news-item-single-text b"><p>x</p></div></section>"#;
        let region = region_from_class(html, "news-item-single-text").unwrap();
        assert!(region.starts_with("<div"));
        assert!(region_from_class(html, "news-item").is_none());
    }

    #[test]
    fn first_child_text_reads_leading_element() {
        let p = "<strong>Maanantai 19.10.</strong><br>Kalakeitto";
        assert_eq!(first_child_text(p).as_deref(), Some("Maanantai 19.10."));
        assert_eq!(first_child_text("plain text"), None);
    }
}
