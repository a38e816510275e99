use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

use crate::error::{BuildEventsError, Result};

/// Datetime layout shared by both GitLab variants, minus the zone suffix.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layout emitted by self-managed instances (e.g., `2024-01-02 03:04:05 +0100`).
const NUMERIC_OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Parses a GitLab webhook datetime into a UTC instant.
///
/// GitLab.com sends `created_at`/`build_started_at` with a zone abbreviation
/// (`2024-01-02 03:04:05 UTC`), while self-managed deployments send a numeric
/// offset (`2024-01-02 03:04:05 +0100`). The abbreviated form is tried first,
/// then the numeric one. No other layouts are accepted.
///
/// # Errors
///
/// Returns [`BuildEventsError::Timestamp`] carrying the original string when
/// neither layout matches.
pub fn resolve(raw: &str) -> Result<DateTime<Utc>> {
    parse_abbreviated(raw)
        .or_else(|| parse_numeric_offset(raw))
        .ok_or_else(|| BuildEventsError::Timestamp(raw.to_string()))
}

fn parse_abbreviated(raw: &str) -> Option<DateTime<Utc>> {
    let (datetime, zone) = raw.rsplit_once(' ')?;
    let offset = abbreviation_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT).ok()?;

    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_numeric_offset(raw: &str) -> Option<DateTime<Utc>> {
    // `%z` alone would also take `+01:00`
    let (_, offset) = raw.rsplit_once(' ')?;
    let digits = offset.strip_prefix(['+', '-'])?;
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    DateTime::parse_from_str(raw, NUMERIC_OFFSET_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Maps a zone abbreviation to its offset.
///
/// Abbreviations carry no reliable offset on their own, so anything that looks
/// like one (3 to 5 upper-case letters, 4+ letter forms ending in `T`) is
/// recorded at UTC.
fn abbreviation_offset(zone: &str) -> Option<FixedOffset> {
    let len = zone.len();
    let well_formed = (3..=5).contains(&len)
        && zone.bytes().all(|b| b.is_ascii_uppercase())
        && (len == 3 || zone.ends_with('T'));

    well_formed.then(|| FixedOffset::east_opt(0)).flatten()
}
