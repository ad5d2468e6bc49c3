use checkscrape_state::CheckDetail;

/// Reconciliation tolerance: `total` computed from the independent path
/// (subtotal + tax + tip + gratuity - discount) may differ from the fused
/// `total` by at most this much before it's flagged.
const RECONCILIATION_TOLERANCE: f64 = 0.05;

/// Whether the §3-mandated total reconciliation holds: `|subtotal + tax +
/// tip + gratuity - discount - total| <= 0.05`. Absent a subtotal or total
/// to compare, there's nothing to reconcile, so this holds vacuously.
fn total_reconciles(detail: &CheckDetail) -> bool {
    match (detail.subtotal, detail.total) {
        (Some(subtotal), Some(total)) => {
            let tax = detail.tax.unwrap_or(0.0);
            let tip = detail.tip.unwrap_or(0.0);
            let gratuity = detail.gratuity.unwrap_or(0.0);
            let discount = detail.discount.unwrap_or(0.0);
            let expected = subtotal + tax + tip + gratuity - discount;
            (expected - total).abs() <= RECONCILIATION_TOLERANCE
        }
        _ => true,
    }
}

/// Builds the `validation_errors` list (§4.2 step 6): the §3-mandated total
/// reconciliation, plus two advisory cross-checks (items sum vs subtotal,
/// payments sum vs total) reported for diagnosis. Only the total
/// reconciliation gates `complete` (see [`is_complete`]) — a partially paid
/// or comped check can still have a non-empty advisory mismatch here
/// without being incomplete.
#[must_use]
pub fn validation_errors(detail: &CheckDetail) -> Vec<String> {
    let mut errors = Vec::new();

    if let (Some(subtotal), Some(total)) = (detail.subtotal, detail.total) {
        if !total_reconciles(detail) {
            let tax = detail.tax.unwrap_or(0.0);
            let tip = detail.tip.unwrap_or(0.0);
            let gratuity = detail.gratuity.unwrap_or(0.0);
            let discount = detail.discount.unwrap_or(0.0);
            let expected = subtotal + tax + tip + gratuity - discount;
            errors.push(format!(
                "total mismatch: expected {expected:.2} from components, found {total:.2}"
            ));
        }
    }

    if !detail.items.is_empty() {
        let items_total: f64 = detail
            .items
            .iter()
            .filter(|item| !item.voided)
            .filter_map(|item| item.line_total)
            .sum();
        if let Some(subtotal) = detail.subtotal {
            if (items_total - subtotal).abs() > RECONCILIATION_TOLERANCE {
                errors.push(format!(
                    "subtotal mismatch: items sum to {items_total:.2}, subtotal is {subtotal:.2}"
                ));
            }
        }
    }

    if !detail.payments.is_empty() {
        let payments_total: f64 = detail
            .payments
            .iter()
            .map(|p| if p.refund { -p.amount.unwrap_or(0.0) } else { p.amount.unwrap_or(0.0) })
            .sum();
        if let Some(total) = detail.total {
            if (payments_total - total).abs() > RECONCILIATION_TOLERANCE {
                errors.push(format!(
                    "payments mismatch: payments sum to {payments_total:.2}, total is {total:.2}"
                ));
            }
        }
    }

    errors
}

/// `complete` is exactly: items non-empty AND (payments non-empty OR total
/// ≈ 0) AND (check_number OR time_opened OR non-empty server present) AND
/// the total reconciles per §3's invariant (§4.2 step 6 supplement). The
/// advisory items/payments cross-checks in `validation_errors` are
/// diagnostic only and never flip `complete`.
#[must_use]
pub fn is_complete(detail: &CheckDetail) -> bool {
    let has_items = !detail.items.is_empty();
    let has_payments_or_zero_total = !detail.payments.is_empty()
        || detail.total.map(|t| t.abs() < RECONCILIATION_TOLERANCE).unwrap_or(false);
    let has_identity = detail.check_number.is_some()
        || detail.time_opened.is_some()
        || detail.server.as_deref().is_some_and(|s| !s.trim().is_empty());

    has_items && has_payments_or_zero_total && has_identity && total_reconciles(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkscrape_state::LineItem;
    use checkscrape_state::Payment;
    use checkscrape_state::PaymentType;
    use pretty_assertions::assert_eq;

    fn base_detail() -> CheckDetail {
        CheckDetail {
            check_number: Some(42),
            subtotal: Some(40.0),
            tax: Some(3.5),
            tip: Some(5.0),
            gratuity: Some(0.0),
            discount: Some(0.0),
            total: Some(48.5),
            items: vec![LineItem {
                item_name: "Burger".into(),
                line_total: Some(40.0),
                ..Default::default()
            }],
            payments: vec![Payment {
                payment_type: PaymentType::Credit,
                payment_date: None,
                amount: Some(48.5),
                tip: None,
                gratuity: None,
                total: None,
                refund: false,
                status: None,
                card_type: None,
                card_last_4: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn reconciled_check_has_no_validation_errors() {
        let detail = base_detail();
        assert!(validation_errors(&detail).is_empty());
    }

    #[test]
    fn within_tolerance_mismatch_is_not_flagged() {
        let mut detail = base_detail();
        detail.total = Some(48.53);
        assert!(validation_errors(&detail).is_empty());
    }

    #[test]
    fn beyond_tolerance_mismatch_is_flagged() {
        let mut detail = base_detail();
        detail.total = Some(60.0);
        let errors = validation_errors(&detail);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("total mismatch"));
    }

    #[test]
    fn complete_requires_items_identity_and_no_errors() {
        let mut detail = base_detail();
        detail.validation_errors = validation_errors(&detail);
        assert!(is_complete(&detail));
    }

    #[test]
    fn incomplete_when_items_empty() {
        let mut detail = base_detail();
        detail.items = Vec::new();
        assert!(!is_complete(&detail));
    }

    #[test]
    fn incomplete_when_no_identity_present() {
        let mut detail = base_detail();
        detail.check_number = None;
        detail.time_opened = None;
        detail.server = None;
        assert!(!is_complete(&detail));
    }

    #[test]
    fn complete_when_total_is_zero_and_payments_empty() {
        let mut detail = base_detail();
        detail.payments = Vec::new();
        detail.total = Some(0.0);
        detail.validation_errors = Vec::new();
        assert!(is_complete(&detail));
    }

    #[test]
    fn advisory_subtotal_mismatch_does_not_block_complete() {
        let mut detail = base_detail();
        // Items sum to 40.0 but subtotal claims 35.0 — an advisory mismatch
        // (e.g. a comped or partially-voided item), while the total still
        // reconciles against the (wrong) subtotal.
        detail.subtotal = Some(35.0);
        detail.total = Some(43.5);
        let errors = validation_errors(&detail);
        assert!(errors.iter().any(|e| e.contains("subtotal mismatch")));
        assert!(!errors.iter().any(|e| e.contains("total mismatch")));
        detail.validation_errors = errors;
        assert!(is_complete(&detail));
    }

    #[test]
    fn advisory_payments_mismatch_does_not_block_complete() {
        let mut detail = base_detail();
        // Payments sum to 48.5 but total claims 60.0, a partial payment that
        // the total itself still reconciles against its own components.
        detail.subtotal = Some(51.5);
        detail.total = Some(60.0);
        let errors = validation_errors(&detail);
        assert!(errors.iter().any(|e| e.contains("payments mismatch")));
        assert!(!errors.iter().any(|e| e.contains("total mismatch")));
        detail.validation_errors = errors;
        assert!(is_complete(&detail));
    }

    #[test]
    fn total_mismatch_blocks_complete_even_with_no_advisory_errors() {
        let mut detail = base_detail();
        detail.total = Some(60.0);
        detail.validation_errors = validation_errors(&detail);
        assert!(!is_complete(&detail));
    }
}
