use chrono::NaiveDateTime;

/// Fixed set of formats the report renders timestamps in, tried in order;
/// ISO 8601 first since it's unambiguous, then the vendor's locale-specific
/// formats (§4.2 step 4).
const FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M",
    "%m/%d/%y %I:%M %p",
    "%m-%d-%Y %I:%M %p",
];

#[must_use]
pub fn parse_flexible(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// Turnover time in whole minutes between open and close timestamps; `None`
/// when either side doesn't parse, or when close precedes open (a parse
/// artifact, never a real negative turnover).
#[must_use]
pub fn turnover_minutes(opened: &str, closed: &str) -> Option<f64> {
    let opened = parse_flexible(opened)?;
    let closed = parse_flexible(closed)?;
    let delta = closed.signed_duration_since(opened);
    let minutes = delta.num_seconds() as f64 / 60.0;
    if minutes < 0.0 {
        None
    } else {
        Some(minutes)
    }
}
