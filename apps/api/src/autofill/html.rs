//! Minimal HTML handling for rich-text summaries.
//!
//! Summaries come back from the model as HTML fragments. Only a small set of
//! formatting tags is accepted; everything else is reported or stripped.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

pub const ALLOWED_TAGS: &[&str] = &["p", "br", "strong", "b", "em", "i", "u", "ul", "ol", "li"];

static RE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\s*(/)?\s*([A-Za-z][A-Za-z0-9]*)\b[^>]*?(/)?\s*>").unwrap());

static RE_DANGEROUS_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>").unwrap()
});

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn is_allowed(tag: &str) -> bool {
    ALLOWED_TAGS.contains(&tag)
}

/// Lower-cased names of tags outside the allow-list, deduplicated and sorted.
pub fn disallowed_tags(html: &str) -> Vec<String> {
    RE_TAG
        .captures_iter(html)
        .map(|c| c[2].to_lowercase())
        .filter(|t| !is_allowed(t))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Drops script/style blocks, removes disallowed tags (keeping their text)
/// and strips attributes from allowed ones.
pub fn sanitize_html(html: &str) -> String {
    let without_blocks = RE_DANGEROUS_BLOCK.replace_all(html, "");
    RE_TAG
        .replace_all(&without_blocks, |c: &regex::Captures<'_>| {
            let name = c[2].to_lowercase();
            if !is_allowed(&name) {
                return String::new();
            }
            if name == "br" {
                return "<br>".to_string();
            }
            if c.get(1).is_some() {
                format!("</{name}>")
            } else {
                format!("<{name}>")
            }
        })
        .trim()
        .to_string()
}

/// Plain-text rendering: block ends become newlines, list items become dashes.
pub fn html_to_text(html: &str) -> String {
    let sanitized = sanitize_html(html);
    let text = RE_TAG.replace_all(&sanitized, |c: &regex::Captures<'_>| {
        let closing = c.get(1).is_some();
        match (c[2].to_lowercase().as_str(), closing) {
            ("br", _) => "\n".to_string(),
            ("p", true) | ("ul", true) | ("ol", true) | ("li", true) => "\n".to_string(),
            ("li", false) => "- ".to_string(),
            _ => String::new(),
        }
    });
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    RE_BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}
