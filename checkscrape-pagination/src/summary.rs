use regex_lite::Regex;

/// The authoritative row count read from the last `.pagination-summary` on
/// the page: `Showing X through Y of Z` (§4.6 invariant 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSummary {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

fn summary_regex() -> Regex {
    Regex::new(r"(?i)showing\s+(\d+)\s+through\s+(\d+)\s+of\s+(\d+)").expect("valid regex")
}

#[must_use]
pub fn parse_summary(text: &str) -> Option<PaginationSummary> {
    let caps = summary_regex().captures(text)?;
    Some(PaginationSummary {
        start: caps.get(1)?.as_str().parse().ok()?,
        end: caps.get(2)?.as_str().parse().ok()?,
        total: caps.get(3)?.as_str().parse().ok()?,
    })
}
