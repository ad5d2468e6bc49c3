/// Totals reported in the `run_complete` event and returned to the caller
/// (§6.4).
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub order_details_pages_fetched: u32,
    pub checks_collected: u64,
    pub menu_summary_rows: usize,
    pub restarts: u32,
    pub envelope_written: bool,
}
