//! Date-range handling for résumé periods ("jan 2020 - mar 2022", "2019 – Atual").

use std::cmp::{Ordering, Reverse};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_CURRENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(atual|atualmente|presente|o momento|hoje|current|present|now)\b").unwrap()
});

static RE_DATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(jan|fev|feb|mar|abr|apr|mai|may|jun|jul|ago|aug|set|sep|out|oct|nov|dez|dec)[a-zç]*\.?\s*(?:de\s+|/\s*)?(\d{4})|(\d{1,2})\s*/\s*(\d{4})|(\d{4}))\b",
    )
    .unwrap()
});

/// A line that contains nothing but a period, e.g. "03/2019 - 05/2021" or "2020 – Presente".
static RE_PERIOD_ONLY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\(?\s*(?:[a-zç]{3,9}\.?\s*(?:de\s+|/\s*)?\d{4}|\d{1,2}\s*/\s*\d{4}|\d{4})\s*(?:[-–—]|a|até|to)\s*(?:[a-zç]{3,9}\.?\s*(?:de\s+|/\s*)?\d{4}|\d{1,2}\s*/\s*\d{4}|\d{4}|atual|atualmente|presente|o momento|current|present)\s*\)?$",
    )
    .unwrap()
});

/// Sort key for a free-text period. Ascending order is display order:
/// ongoing first, then concrete end dates newest to oldest, then unparseable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSortKey {
    Current,
    /// `month` is 0 when only the year is known.
    Month { year: i32, month: u32 },
    Unknown,
}

impl DateSortKey {
    fn rank(&self) -> (u8, Reverse<i32>, Reverse<u32>) {
        match *self {
            DateSortKey::Current => (0, Reverse(0), Reverse(0)),
            DateSortKey::Month { year, month } => (1, Reverse(year), Reverse(month)),
            DateSortKey::Unknown => (2, Reverse(0), Reverse(0)),
        }
    }
}

impl Ord for DateSortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for DateSortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Derives the sort key of a period from its end date.
pub fn date_sort_key(period: &str) -> DateSortKey {
    if RE_CURRENT.is_match(period) {
        return DateSortKey::Current;
    }
    RE_DATE_TOKEN
        .captures_iter(period)
        .last()
        .and_then(|caps| {
            if let (Some(name), Some(year)) = (caps.get(1), caps.get(2)) {
                let month = month_from_name(name.as_str())?;
                return Some(DateSortKey::Month {
                    year: year.as_str().parse().ok()?,
                    month,
                });
            }
            if let (Some(month), Some(year)) = (caps.get(3), caps.get(4)) {
                let month: u32 = month.as_str().parse().ok()?;
                if !(1..=12).contains(&month) {
                    return None;
                }
                return Some(DateSortKey::Month {
                    year: year.as_str().parse().ok()?,
                    month,
                });
            }
            caps.get(5).and_then(|y| {
                Some(DateSortKey::Month {
                    year: y.as_str().parse().ok()?,
                    month: 0,
                })
            })
        })
        .unwrap_or(DateSortKey::Unknown)
}

/// True when the whole line is a date range.
pub fn is_period_line(line: &str) -> bool {
    RE_PERIOD_ONLY.is_match(line.trim())
}

/// Stable sort, most recent first.
pub fn sort_most_recent_first<T>(items: &mut [T], period_of: impl Fn(&T) -> &str) {
    items.sort_by_key(|item| date_sort_key(period_of(item)));
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_lowercase().as_str() {
        "jan" => 1,
        "fev" | "feb" => 2,
        "mar" => 3,
        "abr" | "apr" => 4,
        "mai" | "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "ago" | "aug" => 8,
        "set" | "sep" => 9,
        "out" | "oct" => 10,
        "nov" => 11,
        "dez" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}
