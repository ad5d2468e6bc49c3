use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::StateMap;

/// Normalized payment method classification (§4.2 step 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Credit,
    Debit,
    Cash,
    GiftCard,
    /// The cleaned raw string, when no keyword classification matched.
    Other(String),
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentType::Credit => write!(f, "credit"),
            PaymentType::Debit => write!(f, "debit"),
            PaymentType::Cash => write!(f, "cash"),
            PaymentType::GiftCard => write!(f, "Gift Card"),
            PaymentType::Other(raw) => write!(f, "{raw}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_name: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub discount: Option<f64>,
    pub line_total: Option<f64>,
    pub line_tax: Option<f64>,
    pub line_total_with_tax: Option<f64>,
    #[serde(default)]
    pub voided: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_type: PaymentType,
    pub payment_date: Option<String>,
    pub amount: Option<f64>,
    pub tip: Option<f64>,
    pub gratuity: Option<f64>,
    pub total: Option<f64>,
    #[serde(default)]
    pub refund: bool,
    pub status: Option<String>,
    pub card_type: Option<String>,
    pub card_last_4: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub applied_date: Option<String>,
    pub approver: Option<String>,
    pub reason: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckDetail {
    pub check_number: Option<i64>,
    pub time_opened: Option<String>,
    pub time_closed: Option<String>,
    pub turnover_time: Option<f64>,

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

    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub discounts: Vec<Discount>,

    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub payment_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub data: CheckDetail,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub attempts: u32,
    pub last_error: Option<String>,
    pub extracted_at: Option<DateTime<Utc>>,
    pub parsed_url: String,
}

impl CheckRecord {
    #[must_use]
    pub fn new_minimal(payment_id: &str, parsed_url: &str) -> Self {
        Self {
            payment_id: payment_id.to_string(),
            metadata: BTreeMap::new(),
            data: CheckDetail::default(),
            complete: false,
            attempts: 0,
            last_error: None,
            extracted_at: None,
            parsed_url: parsed_url.to_string(),
        }
    }

    /// Backward-compatibility migration for the legacy on-disk shape, where
    /// metadata headers were nested inside a `columns` sub-mapping. Flattens
    /// `columns` into the top-level metadata map and synthesizes
    /// `parsed_url` from the report URL constant when absent.
    pub fn migrate_legacy(raw: &mut serde_json::Value, report_url: &str) {
        let Some(obj) = raw.as_object_mut() else {
            return;
        };
        if let Some(columns) = obj.remove("columns") {
            if let Some(columns_obj) = columns.as_object() {
                let metadata = obj
                    .entry("metadata")
                    .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
                if let Some(metadata_obj) = metadata.as_object_mut() {
                    for (key, value) in columns_obj {
                        metadata_obj.entry(key.clone()).or_insert(value.clone());
                    }
                }
            }
        }
        if !obj.contains_key("parsed_url") || obj.get("parsed_url") == Some(&serde_json::Value::Null)
        {
            obj.insert(
                "parsed_url".to_string(),
                serde_json::Value::String(report_url.to_string()),
            );
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuSummaryRow(pub BTreeMap<String, String>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub run_id: String,
    pub updated_at: DateTime<Utc>,
    pub total: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub errored: usize,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn from_state(state: &StateMap, run_id: &str, updated_at: DateTime<Utc>) -> Self {
        let total = state.len();
        let complete = state.values().filter(|r| r.complete).count();
        let errored = state.values().filter(|r| r.last_error.is_some()).count();
        Self {
            run_id: run_id.to_string(),
            updated_at,
            total,
            complete,
            incomplete: total.saturating_sub(complete),
            errored,
        }
    }
}

/// One line of the append-only JSON-lines error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub ts: DateTime<Utc>,
    pub event: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl ErrorEvent {
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            event: event.into(),
            payment_id: None,
            fields: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = fields;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn migrate_legacy_flattens_columns_into_metadata() {
        let mut raw = serde_json::json!({
            "payment_id": "p001",
            "columns": {"Order #": "1001", "Server": "Alex"},
            "data": {},
        });
        CheckRecord::migrate_legacy(&mut raw, "https://example.test/reports");
        assert_eq!(raw["metadata"]["Order #"], "1001");
        assert_eq!(raw["metadata"]["Server"], "Alex");
        assert!(raw.get("columns").is_none());
        assert_eq!(raw["parsed_url"], "https://example.test/reports");
    }

    #[test]
    fn migrate_legacy_preserves_existing_parsed_url() {
        let mut raw = serde_json::json!({
            "payment_id": "p001",
            "parsed_url": "https://example.test/custom",
        });
        CheckRecord::migrate_legacy(&mut raw, "https://example.test/reports");
        assert_eq!(raw["parsed_url"], "https://example.test/custom");
    }

    #[test]
    fn progress_snapshot_counts_complete_and_errored() {
        let mut state = StateMap::new();
        let mut complete = CheckRecord::new_minimal("p001", "u");
        complete.complete = true;
        let mut errored = CheckRecord::new_minimal("p002", "u");
        errored.last_error = Some("boom".into());
        state.insert("p001".into(), complete);
        state.insert("p002".into(), errored);

        let snapshot = ProgressSnapshot::from_state(&state, "run-1", Utc::now());
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.complete, 1);
        assert_eq!(snapshot.incomplete, 1);
        assert_eq!(snapshot.errored, 1);
    }
}
