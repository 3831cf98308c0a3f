use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());

/// Brazilian landline/mobile numbers with optional +55 and area code.
static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?55\s?)?(?:\(?\d{2}\)?\s?)?9?\s?\d{4}[\-\s.]?\d{4}\b").unwrap()
});

static RE_LINKEDIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:[a-z]{2,3}\.)?linkedin\.com/in/[A-Za-z0-9_\-%]+/?").unwrap()
});

static RE_GITHUB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:https?://)?github\.com/[A-Za-z0-9_\-]+").unwrap());

/// Contact details pulled out of free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedContacts {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

impl ExtractedContacts {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.linkedin.is_none()
    }
}

/// Single pass over the text; the first match of each kind wins.
pub fn extract_contacts(text: &str) -> ExtractedContacts {
    ExtractedContacts {
        email: RE_EMAIL.find(text).map(|m| m.as_str().to_lowercase()),
        phone: find_phone(text),
        linkedin: RE_LINKEDIN.find(text).map(|m| normalize_url(m.as_str())),
        github: RE_GITHUB.find(text).map(|m| normalize_url(m.as_str())),
    }
}

/// True when the line is mostly contact information.
pub fn is_contact_line(line: &str) -> bool {
    RE_EMAIL.is_match(line)
        || RE_LINKEDIN.is_match(line)
        || RE_GITHUB.is_match(line)
        || find_phone(line).is_some()
}

fn find_phone(text: &str) -> Option<String> {
    RE_PHONE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        // Plain 8-digit runs inside dates or ids are not phone numbers.
        .find(|candidate| candidate.chars().filter(|c| c.is_ascii_digit()).count() >= 10)
}

fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}
