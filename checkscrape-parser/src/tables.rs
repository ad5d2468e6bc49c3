use checkscrape_state::Discount;
use checkscrape_state::LineItem;

use crate::numbers::parse_decimal;
use crate::payload::RawTable;
use crate::payload::normalize_header;
use crate::payments::extract_payments_from_table;
use checkscrape_state::Payment;

/// Classified target tables: the first table matching each header shape
/// wins; unrecognized tables are ignored (§4.2 step 1).
pub struct ClassifiedTables<'a> {
    pub items: Option<&'a RawTable>,
    pub discounts: Option<&'a RawTable>,
    pub payments: Option<&'a RawTable>,
}

pub fn classify_tables(tables: &[RawTable]) -> ClassifiedTables<'_> {
    ClassifiedTables {
        items: tables.iter().find(|t| is_items_table(t)),
        discounts: tables.iter().find(|t| is_discounts_table(t)),
        payments: tables.iter().find(|t| is_payments_table(t)),
    }
}

fn headers_contain(table: &RawTable, token: &str) -> bool {
    table
        .headers
        .iter()
        .any(|h| normalize_header(h).contains(token))
}

fn is_items_table(table: &RawTable) -> bool {
    let has_item = headers_contain(table, "item") || headers_contain(table, "menu");
    let has_qty = headers_contain(table, "qty") || headers_contain(table, "quantity");
    has_item && has_qty
}

fn is_discounts_table(table: &RawTable) -> bool {
    headers_contain(table, "name")
        && headers_contain(table, "amount")
        && headers_contain(table, "applied date")
}

fn is_payments_table(table: &RawTable) -> bool {
    let has_kind =
        headers_contain(table, "payment") || headers_contain(table, "method") || headers_contain(table, "card");
    let has_amount = headers_contain(table, "amount") || headers_contain(table, "total");
    has_kind && has_amount
}

/// Extracts line items, deriving `line_total` from `quantity*unit_price -
/// discount` and `line_total_with_tax` from `line_total + line_tax` when
/// either is absent from the table (§4.2 supplement).
pub fn extract_items(table: &RawTable) -> Vec<LineItem> {
    let item_idx = table.column_index(|h| h.contains("item") || h.contains("menu"));
    let qty_idx = table.column_index(|h| h.contains("qty") || h.contains("quantity"));
    let unit_price_idx = table.column_index(|h| h.contains("unit price") || h.contains("price"));
    let discount_idx = table.column_index(|h| h.contains("discount"));
    let line_total_idx = table.column_index(|h| h.contains("line total") || h == "total");
    let line_tax_idx = table.column_index(|h| h.contains("tax"));
    let line_total_with_tax_idx = table.column_index(|h| h.contains("total") && h.contains("tax"));
    let voided_idx = table.column_index(|h| h.contains("void"));
    let reason_idx = table.column_index(|h| h.contains("reason"));

    table
        .rows
        .iter()
        .filter_map(|row| {
            let item_name = table.cell(row, item_idx)?;
            let quantity = table.cell(row, qty_idx).and_then(|v| parse_decimal(&v));
            let unit_price = table
                .cell(row, unit_price_idx)
                .and_then(|v| parse_decimal(&v));
            let discount = table.cell(row, discount_idx).and_then(|v| parse_decimal(&v));
            let mut line_total = table
                .cell(row, line_total_idx)
                .and_then(|v| parse_decimal(&v));
            let line_tax = table.cell(row, line_tax_idx).and_then(|v| parse_decimal(&v));
            let mut line_total_with_tax = table
                .cell(row, line_total_with_tax_idx)
                .and_then(|v| parse_decimal(&v));

            if line_total.is_none() {
                if let (Some(q), Some(u)) = (quantity, unit_price) {
                    line_total = Some(q * u - discount.unwrap_or(0.0));
                }
            }
            if line_total_with_tax.is_none() {
                if let (Some(lt), Some(tax)) = (line_total, line_tax) {
                    line_total_with_tax = Some(lt + tax);
                }
            }

            let voided = table
                .cell(row, voided_idx)
                .map(|v| {
                    let lowered = v.to_lowercase();
                    lowered == "true" || lowered == "yes" || lowered == "voided"
                })
                .unwrap_or(false);

            Some(LineItem {
                item_name,
                modifiers: Vec::new(),
                quantity,
                unit_price,
                discount,
                line_total,
                line_tax,
                line_total_with_tax,
                voided,
                reason: table.cell(row, reason_idx),
            })
        })
        .collect()
}

pub fn extract_discounts(table: &RawTable) -> Vec<Discount> {
    let name_idx = table.column_index(|h| h.contains("name"));
    let amount_idx = table.column_index(|h| h.contains("amount"));
    let applied_idx = table.column_index(|h| h.contains("applied date"));
    let approver_idx = table.column_index(|h| h.contains("approver"));
    let reason_idx = table.column_index(|h| h.contains("reason"));
    let comment_idx = table.column_index(|h| h.contains("comment"));

    table
        .rows
        .iter()
        .map(|row| Discount {
            name: table.cell(row, name_idx),
            amount: table.cell(row, amount_idx).and_then(|v| parse_decimal(&v)),
            applied_date: table.cell(row, applied_idx),
            approver: table.cell(row, approver_idx),
            reason: table.cell(row, reason_idx),
            comment: table.cell(row, comment_idx),
        })
        .collect()
}

pub fn extract_payments(table: &RawTable) -> Vec<Payment> {
    extract_payments_from_table(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_items_discounts_and_payments_tables() {
        let items = RawTable::new(vec!["Item", "Qty", "Unit Price"], vec![]);
        let discounts = RawTable::new(vec!["Name", "Amount", "Applied Date"], vec![]);
        let payments = RawTable::new(vec!["Payment Method", "Amount"], vec![]);
        let unrelated = RawTable::new(vec!["Foo", "Bar"], vec![]);

        let tables = vec![unrelated.clone(), items.clone(), discounts.clone(), payments.clone()];
        let classified = classify_tables(&tables);
        assert_eq!(classified.items, Some(&tables[1]));
        assert_eq!(classified.discounts, Some(&tables[2]));
        assert_eq!(classified.payments, Some(&tables[3]));
    }

    #[test]
    fn first_matching_table_wins_for_each_shape() {
        let first = RawTable::new(vec!["Item", "Qty"], vec![vec!["Soup", "1"]]);
        let second = RawTable::new(vec!["Menu", "Quantity"], vec![vec!["Salad", "2"]]);
        let tables = vec![first.clone(), second];
        let classified = classify_tables(&tables);
        assert_eq!(classified.items, Some(&tables[0]));
    }

    #[test]
    fn derives_line_total_from_quantity_times_unit_price_minus_discount() {
        let table = RawTable::new(
            vec!["Item", "Qty", "Unit Price", "Discount"],
            vec![vec!["Burger", "2", "10.00", "1.00"]],
        );
        let items = extract_items(&table);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].line_total, Some(19.00));
    }

    #[test]
    fn derives_line_total_with_tax_from_line_total_plus_line_tax() {
        let table = RawTable::new(
            vec!["Item", "Qty", "Unit Price", "Tax"],
            vec![vec!["Burger", "1", "10.00", "0.88"]],
        );
        let items = extract_items(&table);
        assert_eq!(items[0].line_total_with_tax, Some(10.88));
    }

    #[test]
    fn extracts_discount_rows() {
        let table = RawTable::new(
            vec!["Name", "Amount", "Applied Date", "Approver"],
            vec![vec!["Employee Discount", "5.00", "2026-07-27", "Manager"]],
        );
        let discounts = extract_discounts(&table);
        assert_eq!(discounts.len(), 1);
        assert_eq!(discounts[0].name.as_deref(), Some("Employee Discount"));
        assert_eq!(discounts[0].amount, Some(5.00));
    }
}
