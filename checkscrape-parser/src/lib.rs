//! Pure DOM-payload-to-`CheckDetail` parser: no I/O, deterministic given its
//! input (§4.2).

mod datetime;
mod fusion;
mod numbers;
mod payload;
mod payments;
mod server;
mod tables;
mod validate;

pub use numbers::parse_decimal;
pub use numbers::parse_int;
pub use payload::DetailPayload;
pub use payload::RawTable;

use checkscrape_state::CheckDetail;

/// Parses one order-detail payload into a validated [`CheckDetail`].
///
/// Table classification picks the first items/discounts/payments table
/// matching each header shape; every identity and monetary field then goes
/// through the summary → pairs → regex → metadata fusion chain; tax is
/// derived when missing; the server name is sanitized; and the result is
/// reconciled to produce `validation_errors` and `complete`.
#[must_use]
pub fn parse(payload: &DetailPayload) -> CheckDetail {
    let classified = tables::classify_tables(&payload.tables);

    let items = classified.items.map(tables::extract_items).unwrap_or_default();
    let discounts = classified
        .discounts
        .map(tables::extract_discounts)
        .unwrap_or_default();
    let payments = classified
        .payments
        .map(tables::extract_payments)
        .unwrap_or_default();

    let fused = fusion::fuse_fields(payload);

    let time_closed = fused.time_closed.or_else(|| {
        payments
            .iter()
            .filter_map(|p| p.payment_date.clone())
            .max_by_key(|date| datetime::parse_flexible(date).map(|dt| dt.and_utc().timestamp()))
    });

    let turnover_time = match (&fused.time_opened, &time_closed) {
        (Some(opened), Some(closed)) => {
            datetime::turnover_minutes(opened, closed).map(|m| (m * 100.0).round() / 100.0)
        }
        _ => None,
    };

    let item_tax_deltas = items.iter().filter_map(|item| match (item.line_total_with_tax, item.line_total) {
        (Some(with_tax), Some(net)) => Some(with_tax - net),
        _ => None,
    });
    let tax = fusion::derive_tax(
        fused.tax,
        fused.subtotal,
        fused.total,
        fused.tip,
        fused.gratuity,
        item_tax_deltas,
    );

    let server = fused.server.as_deref().and_then(server::sanitize_server);

    let mut detail = CheckDetail {
        check_number: fused.check_number,
        time_opened: fused.time_opened,
        time_closed,
        turnover_time,
        server,
        table: fused.table,
        guest_count: fused.guest_count,
        revenue_center: fused.revenue_center,
        subtotal: fused.subtotal,
        tax,
        tip: fused.tip,
        gratuity: fused.gratuity,
        discount: fused.discount,
        total: fused.total,
        items,
        payments,
        discounts,
        validation_errors: Vec::new(),
        complete: false,
    };

    detail.validation_errors = validate::validation_errors(&detail);
    detail.complete = validate::is_complete(&detail);
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkscrape_state::PaymentType;
    use pretty_assertions::assert_eq;

    fn sample_payload() -> DetailPayload {
        DetailPayload::new()
            .with_summary("check_number", "Check #4821")
            .with_pair("server", "Opened by server: Alex Torres")
            .with_pair("time_opened", "07/27/2026 06:00 PM")
            .with_summary("subtotal", "40.00")
            .with_summary("tax", "3.50")
            .with_summary("tip", "5.00")
            .with_summary("total", "48.50")
            .with_table(RawTable::new(
                vec!["Item", "Qty", "Unit Price"],
                vec![vec!["Burger", "1", "40.00"]],
            ))
            .with_table(RawTable::new(
                vec!["Payment Method", "Amount", "Date"],
                vec![vec!["Visa ending in 4242", "48.50", "07/27/2026 07:30 PM"]],
            ))
    }

    #[test]
    fn parses_a_clean_reconciled_check() {
        let detail = parse(&sample_payload());
        assert_eq!(detail.server.as_deref(), Some("Alex Torres"));
        assert_eq!(detail.total, Some(48.50));
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.payments.len(), 1);
        assert_eq!(detail.payments[0].payment_type, PaymentType::Credit);
        assert_eq!(detail.payments[0].card_last_4.as_deref(), Some("4242"));
        assert!(detail.validation_errors.is_empty());
        assert!(detail.complete);
        assert_eq!(detail.turnover_time, Some(90.0));
    }

    #[test]
    fn derives_tax_when_absent_from_all_sources() {
        let payload = DetailPayload::new()
            .with_pair("time_opened", "07/27/2026 06:00 PM")
            .with_summary("subtotal", "40.00")
            .with_summary("total", "43.50")
            .with_table(RawTable::new(
                vec!["Item", "Qty", "Unit Price"],
                vec![vec!["Burger", "1", "40.00"]],
            ));
        let detail = parse(&payload);
        assert_eq!(detail.tax, Some(3.50));
    }

    #[test]
    fn missing_items_marks_incomplete_with_no_errors_required() {
        let payload = DetailPayload::new().with_pair("time_opened", "07/27/2026 06:00 PM");
        let detail = parse(&payload);
        assert!(!detail.complete);
        assert!(detail.items.is_empty());
    }

    #[test]
    fn unreconciled_total_produces_validation_error_and_incomplete() {
        let mut payload = sample_payload();
        payload.summary.insert("total".to_string(), "90.00".to_string());
        let detail = parse(&payload);
        assert!(!detail.validation_errors.is_empty());
        assert!(!detail.complete);
    }
}
