use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::CheckRecord;
use crate::MenuSummaryRow;
use crate::ProgressSnapshot;

/// The per-day JSON wrapper handed to a downstream loader. This is the one
/// artifact consumed outside the core; the loader itself is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayEnvelope {
    pub business_date: String,
    pub generated_at: DateTime<Utc>,
    pub checks: Vec<CheckRecord>,
    pub menu_items_summary: Vec<MenuSummaryRow>,
    pub progress: ProgressSnapshot,
}
