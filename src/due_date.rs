//! Due-date resolution.
//!
//! The week calendar gives a date-only token (`2022-01-07`) and a short time
//! token (`11:59pm`, sometimes `11pm`). They are joined as `"{day} {time}"`
//! and parsed with a strict `hour:minute(am|pm)` format, then with an
//! `hour(am|pm)` fallback whose minutes resolve to zero. Anything else fails.

use std::sync::LazyLock;

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::{SyncError, SyncResult};

/// `2022-01-07 11:59pm`
const PRIMARY_FORMAT: &str = "%Y-%m-%d %I:%M%p";
/// `2022-01-07 11pm`
const FALLBACK_FORMAT: &str = "%Y-%m-%d %I%p";

// chrono accepts single-digit minutes for `%M`; the token shape is checked first.
static PRIMARY_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d{1,2}:\d{2}[ap]m$")
        .unwrap_or_else(|e| panic!("invalid time pattern: {e}"))
});
static FALLBACK_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d{1,2}[ap]m$").unwrap_or_else(|e| panic!("invalid time pattern: {e}"))
});

/// Combine a day token and a time token into a local timestamp.
///
/// # Errors
///
/// Returns [`SyncError::DateResolution`] carrying the concatenated string if
/// neither format matches.
pub fn resolve_due_date(day: &str, time: &str) -> SyncResult<NaiveDateTime> {
    let raw = format!("{} {}", day, time);

    if PRIMARY_TIME.is_match(time) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&raw, PRIMARY_FORMAT) {
            return Ok(dt);
        }
    } else if FALLBACK_TIME.is_match(time) {
        if let Some(dt) = parse_without_minutes(&raw) {
            return Ok(dt);
        }
    }

    Err(SyncError::DateResolution { raw })
}

fn parse_without_minutes(raw: &str) -> Option<NaiveDateTime> {
    let mut parsed = Parsed::new();
    parse(&mut parsed, raw, StrftimeItems::new(FALLBACK_FORMAT)).ok()?;
    parsed.set_minute(0).ok()?;
    parsed.to_naive_datetime_with_offset(0).ok()
}
