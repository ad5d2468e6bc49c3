use std::sync::OnceLock;

use checkscrape_state::Payment;
use checkscrape_state::PaymentType;
use regex_lite::Regex;

use crate::numbers::parse_decimal;
use crate::payload::RawTable;

/// Classifies a raw payment-method string in gift-card > credit > debit >
/// cash priority order (§4.2 step 3): a row mentioning "gift card" is never
/// miscounted as credit even if it also carries a card brand name.
fn classify_payment_type(raw: &str) -> PaymentType {
    let lowered = raw.to_lowercase();
    if lowered.contains("gift") {
        PaymentType::GiftCard
    } else if lowered.contains("credit") || lowered.contains("visa") || lowered.contains("mastercard")
        || lowered.contains("amex") || lowered.contains("discover")
    {
        PaymentType::Credit
    } else if lowered.contains("debit") {
        PaymentType::Debit
    } else if lowered.contains("cash") {
        PaymentType::Cash
    } else {
        PaymentType::Other(raw.trim().to_string())
    }
}

/// `None` only if the pattern below is broken at compile time; callers treat
/// that as "no match" rather than panicking.
fn card_last_4_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"(?:ending in|x{2,4}|\*{2,4}|#)\s*(\d{4})\b").ok())
        .as_ref()
}

fn card_type_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(r"(?i)\b(visa|mastercard|amex|american express|discover)\b").ok())
        .as_ref()
}

/// Extracts the last 4 digits of a card number from free text, trying the
/// "ending in 1234" / "xxxx1234" / "****1234" / "#1234" patterns in order.
#[must_use]
pub fn extract_card_last_4(raw: &str) -> Option<String> {
    card_last_4_regex()?
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[must_use]
pub fn extract_card_type(raw: &str) -> Option<String> {
    card_type_regex()?
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_payments_from_table(table: &RawTable) -> Vec<Payment> {
    let kind_idx = table.column_index(|h| h.contains("payment") || h.contains("method") || h.contains("card"));
    let date_idx = table.column_index(|h| h.contains("date"));
    let amount_idx = table.column_index(|h| h.contains("amount"));
    let tip_idx = table.column_index(|h| h.contains("tip"));
    let gratuity_idx = table.column_index(|h| h.contains("gratuity"));
    let total_idx = table.column_index(|h| h.contains("total"));
    let refund_idx = table.column_index(|h| h.contains("refund"));
    let status_idx = table.column_index(|h| h.contains("status"));

    table
        .rows
        .iter()
        .filter_map(|row| {
            let kind_raw = table.cell(row, kind_idx)?;
            let mut payment_type = classify_payment_type(&kind_raw);
            // Gift card payments never carry a card brand/last-4 pair.
            let (card_type, card_last_4) = if matches!(payment_type, PaymentType::GiftCard) {
                (None, None)
            } else {
                (extract_card_type(&kind_raw), extract_card_last_4(&kind_raw))
            };
            if matches!(payment_type, PaymentType::Other(_)) && card_type.is_some() {
                payment_type = PaymentType::Credit;
            }

            let refund = table
                .cell(row, refund_idx)
                .map(|v| {
                    let lowered = v.to_lowercase();
                    lowered == "true" || lowered == "yes" || lowered == "refund" || lowered == "refunded"
                })
                .unwrap_or(false);

            Some(Payment {
                payment_type,
                payment_date: table.cell(row, date_idx),
                amount: table.cell(row, amount_idx).and_then(|v| parse_decimal(&v)),
                tip: table.cell(row, tip_idx).and_then(|v| parse_decimal(&v)),
                gratuity: table.cell(row, gratuity_idx).and_then(|v| parse_decimal(&v)),
                total: table.cell(row, total_idx).and_then(|v| parse_decimal(&v)),
                refund,
                status: table.cell(row, status_idx),
                card_type,
                card_last_4,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_gift_card_ahead_of_credit_keyword() {
        let table = RawTable::new(
            vec!["Payment Method", "Amount"],
            vec![vec!["Visa Gift Card", "20.00"]],
        );
        let payments = extract_payments_from_table(&table);
        assert_eq!(payments[0].payment_type, PaymentType::GiftCard);
        assert_eq!(payments[0].card_last_4, None);
    }

    #[test]
    fn classifies_credit_and_extracts_card_last_4_and_type() {
        let table = RawTable::new(
            vec!["Payment Method", "Amount"],
            vec![vec!["Visa ending in 1234", "42.50"]],
        );
        let payments = extract_payments_from_table(&table);
        assert_eq!(payments[0].payment_type, PaymentType::Credit);
        assert_eq!(payments[0].card_last_4.as_deref(), Some("1234"));
        assert_eq!(payments[0].card_type.as_deref(), Some("Visa"));
    }

    #[test]
    fn classifies_cash_with_no_card_fields() {
        let table = RawTable::new(vec!["Payment Method", "Amount"], vec![vec!["Cash", "10.00"]]);
        let payments = extract_payments_from_table(&table);
        assert_eq!(payments[0].payment_type, PaymentType::Cash);
        assert_eq!(payments[0].card_last_4, None);
        assert_eq!(payments[0].card_type, None);
    }

    #[test]
    fn extract_card_last_4_handles_masked_digits() {
        assert_eq!(extract_card_last_4("xxxx4242"), Some("4242".to_string()));
        assert_eq!(extract_card_last_4("****9876"), Some("9876".to_string()));
        assert_eq!(extract_card_last_4("card #1111"), Some("1111".to_string()));
    }
}
