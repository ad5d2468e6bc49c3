use std::sync::OnceLock;

use regex_lite::Regex;

use crate::numbers::clamp_negligible_tax;
use crate::numbers::parse_decimal;
use crate::numbers::parse_int;
use crate::payload::DetailPayload;

/// Reads a field through the precedence chain (§4.2 step 2): structured
/// summary spans, then the parsed `.check-server-details` summary-detail
/// lines (also structured, checked at the same tier as the summary spans
/// since neither is free text), then label/value pairs, then regex probes
/// over the free-text body, then the metadata mapping, then (last resort) a
/// caller-supplied derivation from payments/items.
fn fused_str(payload: &DetailPayload, keys: &[&str], regexes: &[&Regex]) -> Option<String> {
    for key in keys {
        if let Some(v) = payload.summary.get(*key) {
            return Some(v.clone());
        }
    }
    for key in keys {
        if let Some(v) = payload.summary_details.get(*key) {
            return Some(v.clone());
        }
    }
    for key in keys {
        if let Some(v) = payload.pairs.get(*key) {
            return Some(v.clone());
        }
    }
    for re in regexes {
        if let Some(caps) = re.captures(&payload.body_text) {
            if let Some(m) = caps.get(1) {
                return Some(m.as_str().to_string());
            }
        }
    }
    for key in keys {
        if let Some(v) = payload.metadata.get(*key) {
            return Some(v.clone());
        }
    }
    None
}

fn fused_decimal(payload: &DetailPayload, keys: &[&str], regexes: &[&Regex]) -> Option<f64> {
    fused_str(payload, keys, regexes).and_then(|v| parse_decimal(&v))
}

fn fused_int(payload: &DetailPayload, keys: &[&str], regexes: &[&Regex]) -> Option<i64> {
    fused_str(payload, keys, regexes).and_then(|v| parse_int(&v))
}

/// Fused identity, context, and monetary fields, prior to the payments/items
/// derivation fallbacks that only the caller (which already has the
/// extracted items/payments) can apply.
pub struct FusedFields {
    pub check_number: Option<i64>,
    pub time_opened: Option<String>,
    pub time_closed: Option<String>,
    pub server: Option<String>,
    pub table: Option<String>,
    pub guest_count: Option<i64>,
    pub revenue_center: Option<String>,
    pub subtotal: Option<f64>,
    pub tax: Option<f64>,
    pub tip: Option<f64>,
    pub gratuity: Option<f64>,
    pub discount: Option<f64>,
    pub total: Option<f64>,
}

/// `None` only if the pattern below is broken at compile time; callers treat
/// that as "no regex probe available" rather than panicking.
fn check_number_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"(?i)check\s*#?\s*(\d+)").ok())
        .as_ref()
}

fn guest_count_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"(?i)guests?\s*:?\s*(\d+)").ok())
        .as_ref()
}

pub fn fuse_fields(payload: &DetailPayload) -> FusedFields {
    let check_number_regexes: Vec<&Regex> = check_number_regex().into_iter().collect();
    let guest_count_regexes: Vec<&Regex> = guest_count_regex().into_iter().collect();

    FusedFields {
        check_number: fused_int(payload, &["check_number", "Check #", "Check"], &check_number_regexes),
        time_opened: fused_str(payload, &["time_opened", "Opened", "Open Time"], &[]),
        time_closed: fused_str(payload, &["time_closed", "Closed", "Close Time"], &[]),
        server: fused_str(payload, &["server", "Server"], &[]),
        table: fused_str(payload, &["table", "Table"], &[]),
        guest_count: fused_int(payload, &["guest_count", "Guests", "# Guests"], &guest_count_regexes),
        revenue_center: fused_str(payload, &["revenue_center", "Revenue Center"], &[]),
        subtotal: fused_decimal(payload, &["subtotal", "Subtotal"], &[]),
        tax: fused_decimal(payload, &["tax", "Tax"], &[]),
        tip: fused_decimal(payload, &["tip", "Tip"], &[]),
        gratuity: fused_decimal(payload, &["gratuity", "Gratuity", "Auto Gratuity"], &[]),
        discount: fused_decimal(payload, &["discount", "Discount"], &[]),
        total: fused_decimal(payload, &["total", "Total"], &[]),
    }
}

/// Fills in a missing tax value from the available monetary fields (§4.2
/// step 2): first `total - subtotal - tip - gratuity`, then, failing that,
/// the sum of each item's `with_tax - net` delta. Negligible residuals are
/// clamped to zero either way.
pub fn derive_tax(
    tax: Option<f64>,
    subtotal: Option<f64>,
    total: Option<f64>,
    tip: Option<f64>,
    gratuity: Option<f64>,
    item_tax_deltas: impl Iterator<Item = f64>,
) -> Option<f64> {
    if let Some(tax) = tax {
        return Some(clamp_negligible_tax(tax));
    }
    if let (Some(total), Some(subtotal)) = (total, subtotal) {
        let derived = total - subtotal - tip.unwrap_or(0.0) - gratuity.unwrap_or(0.0);
        return Some(clamp_negligible_tax(derived));
    }
    let summed: f64 = item_tax_deltas.sum();
    if summed != 0.0 {
        return Some(clamp_negligible_tax(summed));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prefers_summary_over_pairs_over_regex_over_metadata() {
        let payload = DetailPayload::new()
            .with_pair("total", "50.00")
            .with_summary("total", "42.00")
            .with_metadata("total", "99.00");
        let fused = fuse_fields(&payload);
        assert_eq!(fused.total, Some(42.00));
    }

    #[test]
    fn summary_details_outrank_pairs_but_not_summary() {
        let payload = DetailPayload::new()
            .with_pair("table", "12")
            .with_summary_detail("table", "7");
        let fused = fuse_fields(&payload);
        assert_eq!(fused.table.as_deref(), Some("7"));

        let payload = DetailPayload::new()
            .with_summary("table", "3")
            .with_summary_detail("table", "7");
        let fused = fuse_fields(&payload);
        assert_eq!(fused.table.as_deref(), Some("3"));
    }

    #[test]
    fn falls_back_to_pairs_when_summary_absent() {
        let payload = DetailPayload::new().with_pair("total", "50.00");
        let fused = fuse_fields(&payload);
        assert_eq!(fused.total, Some(50.00));
    }

    #[test]
    fn falls_back_to_metadata_when_no_other_source_matches() {
        let payload = DetailPayload::new().with_metadata("server", "Alex T");
        let fused = fuse_fields(&payload);
        assert_eq!(fused.server.as_deref(), Some("Alex T"));
    }

    #[test]
    fn derive_tax_prefers_explicit_value() {
        assert_eq!(derive_tax(Some(3.2), None, None, None, None, std::iter::empty()), Some(3.2));
    }

    #[test]
    fn derive_tax_computes_from_total_minus_subtotal_tip_gratuity() {
        let tax = derive_tax(None, Some(40.0), Some(45.0), Some(3.0), Some(1.0), std::iter::empty());
        assert_eq!(tax, Some(1.0));
    }

    #[test]
    fn derive_tax_clamps_negligible_residual_to_zero() {
        let tax = derive_tax(None, Some(40.003), Some(40.0), None, None, std::iter::empty());
        assert_eq!(tax, Some(0.0));
    }

    #[test]
    fn derive_tax_falls_back_to_item_deltas() {
        let tax = derive_tax(None, None, None, None, None, vec![0.44, 0.44].into_iter());
        assert_eq!(tax, Some(0.88));
    }
}
