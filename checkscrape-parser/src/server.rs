use std::sync::OnceLock;

use regex_lite::Regex;

const STATION_MARKERS: &[&str] = &["kiosk", "pos terminal", "kds", "self-service", "register"];

/// `None` only if the pattern above is broken at compile time; callers treat
/// that as "no prefix to strip" rather than panicking.
fn opened_by_prefix_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"(?i)^opened by server:\s*").ok())
        .as_ref()
}

/// Strips leading punctuation, an "Opened by server:" prefix, collapses a
/// doubled "Firstname Lastname Firstname Lastname" rendering down to one
/// copy, and rejects station/device markers or whitespace-only values
/// (§4.2 step 4).
#[must_use]
pub fn sanitize_server(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_prefix = match opened_by_prefix_regex() {
        Some(re) => re.replace(trimmed, ""),
        None => trimmed.into(),
    };
    let cleaned = without_prefix
        .trim_start_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .trim();
    if cleaned.is_empty() {
        return None;
    }
    let lowered = cleaned.to_lowercase();
    if STATION_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return None;
    }

    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() == 4 && words.len() % 2 == 0 {
        let (first_half, second_half) = words.split_at(2);
        if first_half == second_half {
            return Some(first_half.join(" "));
        }
    }

    Some(cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_opened_by_server_prefix() {
        assert_eq!(
            sanitize_server("Opened by server: Alex Torres"),
            Some("Alex Torres".to_string())
        );
    }

    #[test]
    fn strips_leading_punctuation() {
        assert_eq!(sanitize_server(": Alex Torres"), Some("Alex Torres".to_string()));
    }

    #[test]
    fn collapses_doubled_name() {
        assert_eq!(
            sanitize_server("Alex Torres Alex Torres"),
            Some("Alex Torres".to_string())
        );
    }

    #[test]
    fn rejects_station_markers() {
        assert_eq!(sanitize_server("Kiosk 3"), None);
        assert_eq!(sanitize_server("POS Terminal"), None);
    }

    #[test]
    fn rejects_whitespace_only() {
        assert_eq!(sanitize_server("   "), None);
    }
}
