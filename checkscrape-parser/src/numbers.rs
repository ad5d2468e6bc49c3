/// Tolerant decimal parsing: strips currency symbols and thousands
/// separators, treats parenthesized values as negative, and returns `None`
/// (never an error) for anything that still doesn't parse — the parser
/// never fails on a malformed cell, it just leaves the field unset.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let negative_paren = trimmed.starts_with('(') && trimmed.ends_with(')');
    let stripped: String = trimmed
        .trim_start_matches('(')
        .trim_end_matches(')')
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if stripped.is_empty() || stripped == "-" || stripped == "." {
        return None;
    }
    let value: f64 = stripped.parse().ok()?;
    Some(if negative_paren { -value.abs() } else { value })
}

/// Tolerant integer parsing built on [`parse_decimal`] so the same cleanup
/// (currency symbols, parens) applies; truncates rather than rounds.
#[must_use]
pub fn parse_int(raw: &str) -> Option<i64> {
    let digits_only: String = raw.trim().chars().filter(|c| c.is_ascii_digit()).collect();
    if !digits_only.is_empty() && !raw.trim().contains(['.', '-', '(']) {
        return digits_only.parse().ok();
    }
    parse_decimal(raw).map(|value| value.trunc() as i64)
}

/// Clamps a `|value| < 0.005` tax residual to exactly zero (§4.2 step 2).
#[must_use]
pub fn clamp_negligible_tax(value: f64) -> f64 {
    if value.abs() < 0.005 { 0.0 } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_plain_and_currency_decimals() {
        assert_eq!(parse_decimal("128.88"), Some(128.88));
        assert_eq!(parse_decimal("$128.88"), Some(128.88));
        assert_eq!(parse_decimal("1,284.50"), Some(1284.50));
        assert_eq!(parse_decimal("  12.00  "), Some(12.00));
    }

    #[test]
    fn parses_parenthesized_as_negative() {
        assert_eq!(parse_decimal("(5.00)"), Some(-5.00));
    }

    #[test]
    fn unparseable_decimal_yields_none() {
        assert_eq!(parse_decimal("n/a"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("-"), None);
    }

    #[test]
    fn parses_integers_tolerating_commas() {
        assert_eq!(parse_int("1,234"), Some(1234));
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("abc"), None);
    }

    #[test]
    fn negligible_tax_clamps_to_zero() {
        assert_eq!(clamp_negligible_tax(0.001), 0.0);
        assert_eq!(clamp_negligible_tax(-0.004), 0.0);
        assert_eq!(clamp_negligible_tax(0.01), 0.01);
    }
}
