//! Best-effort JSON recovery for LLM output.
//!
//! Models are asked for JSON but regularly wrap it in markdown fences, use
//! single quotes, leave keys bare, or add prose around the payload. The
//! strategies below run in order and the first one that yields a value wins.
//! Only string boundaries are tracked: the textual fixes never touch the
//! inside of a string, but a string value containing an unbalanced brace can
//! still mislead the substring fallbacks.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("LLM output is not valid JSON")]
    NotValidJson,
}

static RE_BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)(\s*:)"#).unwrap());
static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Which strategy produced the value. Logged for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    Strict,
    Repaired,
    ObjectSubstring,
    ArraySubstring,
}

/// Parses `raw` into a JSON value using progressively looser strategies.
pub fn repair_json(raw: &str) -> Result<Value, RepairError> {
    repair_json_with_strategy(raw).map(|(value, _)| value)
}

/// Like [`repair_json`], additionally reporting the strategy that succeeded.
pub fn repair_json_with_strategy(raw: &str) -> Result<(Value, RepairStrategy), RepairError> {
    let text = strip_code_fences(raw);

    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Ok((v, RepairStrategy::Strict));
    }

    if let Some(v) = parse_repaired(text) {
        debug!("Recovered LLM JSON after key/quote repair");
        return Ok((v, RepairStrategy::Repaired));
    }

    if let Some(candidate) = span_between(text, '{', '}') {
        if let Some(v) = parse_loose(candidate) {
            debug!("Recovered LLM JSON from embedded object");
            return Ok((v, RepairStrategy::ObjectSubstring));
        }
    }

    if let Some(candidate) = span_between(text, '[', ']') {
        if let Some(v) = parse_loose(candidate) {
            debug!("Recovered LLM JSON from embedded array");
            return Ok((v, RepairStrategy::ArraySubstring));
        }
    }

    Err(RepairError::NotValidJson)
}

/// Strips ```json ... ``` or ``` ... ``` fences surrounding the payload.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, `javascript`...) up to the first newline.
    let rest = match rest.find('\n') {
        Some(idx) if rest[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => &rest[idx + 1..],
        _ => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

fn parse_loose(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok().or_else(|| parse_repaired(text))
}

fn parse_repaired(text: &str) -> Option<Value> {
    let repaired = repair_syntax(text);
    serde_json::from_str(&repaired).ok()
}

/// Applies the textual fixes: single quotes, bare keys, trailing commas.
/// Double-quoted strings are copied through untouched; single-quoted ones
/// are rewritten as double-quoted strings.
pub fn repair_syntax(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut outside = String::new();
    let mut rest = text;

    while let Some(start) = rest.find(['"', '\'']) {
        outside.push_str(&rest[..start]);
        let quote = if rest.as_bytes()[start] == b'"' { '"' } else { '\'' };
        let body = &rest[start + 1..];
        let Some(end) = closing_quote(body, quote) else {
            outside.push(quote);
            rest = body;
            continue;
        };

        push_outside(&mut out, &mut outside);
        let inner = &body[..end];
        out.push('"');
        if quote == '"' {
            out.push_str(inner);
        } else {
            out.push_str(&inner.replace("\\'", "'").replace('"', "\\\""));
        }
        out.push('"');
        rest = &body[end + 1..];
    }

    outside.push_str(rest);
    push_outside(&mut out, &mut outside);
    out
}

/// Bare-key and trailing-comma fixes on text between strings.
fn push_outside(out: &mut String, outside: &mut String) {
    if outside.is_empty() {
        return;
    }
    let keyed = RE_BARE_KEY.replace_all(outside.as_str(), "$1\"$2\"$3");
    out.push_str(&RE_TRAILING_COMMA.replace_all(&keyed, "$1"));
    outside.clear();
}

/// Byte offset of the unescaped `quote` closing a string whose opening quote
/// has already been consumed. Single-quoted strings end at the line.
fn closing_quote(body: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '\n' if quote == '\'' => return None,
            c if c == quote => return Some(i),
            _ => {}
        }
    }
    None
}

/// First `open` through last `close`, inclusive.
fn span_between(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
