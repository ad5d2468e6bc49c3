use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use checkscrape_browser::Page;
use checkscrape_clock::Clock;
use checkscrape_config::OrderDetailsSelectors;
use checkscrape_parser::DetailPayload;
use checkscrape_state::MenuSummaryRow;
use thiserror::Error;
use tracing::info;
use tracing::warn;

use crate::blocks::ExtractedMenuRow;
use crate::blocks::ExtractedOrderBlock;
use crate::blocks::menu_summary_rows_script;
use crate::blocks::next_clickable_script;
use crate::blocks::order_blocks_script;
use crate::blocks::pagination_summary_script;
use crate::summary::PaginationSummary;
use crate::summary::parse_summary;

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("browser error: {0}")]
    Browser(#[from] checkscrape_browser::BrowserError),
    #[error("failed to parse extracted page payload: {0}")]
    Malformed(String),
}

pub type PaginationResult<T> = Result<T, PaginationError>;

/// One significant pagination step, mirroring §6.4's event log contract.
/// `event` is already namespaced (`order_details_page_fetched`,
/// `menu_summary_pagination_stalled`, …) so the caller can forward it
/// verbatim to both `tracing` and the append-only error log.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationEvent {
    pub event: String,
    pub fields: serde_json::Value,
}

impl PaginationEvent {
    fn new(event: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            fields,
        }
    }
}

/// First-six-payment-id signature used for the anti-loop guard (§3, §4.6
/// step 3): a run never accepts the same signature twice in succession.
#[must_use]
pub fn page_signature(ids: &[String]) -> String {
    ids.iter().take(6).cloned().collect::<Vec<_>>().join(",")
}

/// One order block, reduced to what the caller needs to merge into state:
/// the resolved payment id, raw metadata, and the payload to hand the
/// parser.
pub struct OrderDetailsCrawlOutcome {
    pub blocks: BTreeMap<String, (BTreeMap<String, String>, DetailPayload, String)>,
    pub pages_fetched: u32,
    pub collected: u64,
    pub last_summary: Option<PaginationSummary>,
}

async fn first_present(page: &dyn Page, family: &[String]) -> PaginationResult<Option<String>> {
    for selector in family {
        if page.wait_for_selector(selector, 0).await? {
            return Ok(Some(selector.clone()));
        }
    }
    Ok(None)
}

async fn read_summary(
    page: &dyn Page,
    summary_selector: &str,
) -> PaginationResult<Option<PaginationSummary>> {
    let script = pagination_summary_script(summary_selector);
    let value = page.evaluate(&script).await?;
    Ok(value.as_str().and_then(parse_summary))
}

async fn next_is_clickable(page: &dyn Page, next_button_selector: &str) -> PaginationResult<bool> {
    let script = next_clickable_script(next_button_selector);
    let value = page.evaluate(&script).await?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Waits for a loading spinner (if the family resolves to anything present)
/// to disappear, and for the pagination summary to differ from
/// `pre_click`, bounded by `timeout` (§4.6 step 7).
async fn wait_for_advance(
    page: &dyn Page,
    clock: &dyn Clock,
    selectors: &OrderDetailsSelectors,
    summary_selector: &str,
    pre_click: Option<PaginationSummary>,
    timeout: Duration,
) -> PaginationResult<Option<PaginationSummary>> {
    let deadline = clock.now() + timeout;
    loop {
        let current = read_summary(page, summary_selector).await?;
        let advanced = match (pre_click, current) {
            (Some(before), Some(after)) => before.start != after.start || before.end != after.end,
            (None, Some(_)) => true,
            _ => false,
        };
        let spinner_idle = first_present(page, &selectors.loading_spinner).await?.is_none();
        if advanced && spinner_idle {
            return Ok(current);
        }
        if clock.now() >= deadline {
            return Ok(current);
        }
        clock.sleep(Duration::from_millis(250)).await;
    }
}

/// Drives the Order Details pagination widget (§4.6): the *last*
/// `.pagination` and `.pagination-summary` on the page, clicking `Next`
/// until the summary reports `end >= total`, a repeated page signature is
/// detected, or a page adds nothing new.
#[allow(clippy::too_many_arguments)]
pub async fn crawl_order_details(
    page: &dyn Page,
    clock: &dyn Clock,
    selectors: &OrderDetailsSelectors,
    advance_timeout: Duration,
    max_pages: u32,
    mut on_event: impl FnMut(PaginationEvent),
) -> PaginationResult<OrderDetailsCrawlOutcome> {
    let summary_selector = selectors
        .pagination_summary
        .first()
        .cloned()
        .unwrap_or_default();
    let block_selector = selectors.order_blocks.first().cloned().unwrap_or_default();
    let meta_id_selector = selectors
        .order_detail_meta_id
        .first()
        .cloned()
        .unwrap_or_default();

    let mut blocks = BTreeMap::new();
    let mut seen_signatures: BTreeSet<String> = BTreeSet::new();
    let mut last_summary = None;
    let mut page_number = 0u32;

    loop {
        page_number += 1;
        let script = order_blocks_script(&block_selector, &meta_id_selector);
        let raw = page.evaluate(&script).await?;
        let extracted: Vec<ExtractedOrderBlock> =
            serde_json::from_value(raw).map_err(|err| PaginationError::Malformed(err.to_string()))?;

        let mut page_ids = Vec::new();
        let mut page_added = 0usize;
        for block in extracted {
            let Some(payment_id) = block.payment_id else {
                continue;
            };
            page_ids.push(payment_id.clone());
            blocks.insert(payment_id, (block.metadata, block.payload, block.parsed_url));
            page_added += 1;
        }

        on_event(PaginationEvent::new(
            "order_details_page_fetched",
            serde_json::json!({"page": page_number, "accepted": page_added}),
        ));
        info!(page = page_number, accepted = page_added, "order_details_page_fetched");

        let signature = page_signature(&page_ids);
        if !signature.is_empty() && !seen_signatures.insert(signature.clone()) {
            on_event(PaginationEvent::new(
                "order_details_pagination_stalled",
                serde_json::json!({"reason": "repeated_page_signature", "page": page_number}),
            ));
            warn!(page = page_number, "order_details_pagination_stalled");
            break;
        }

        if page_added == 0 && page_number >= 2 {
            on_event(PaginationEvent::new(
                "order_details_pagination_stalled",
                serde_json::json!({"reason": "no_rows_added", "page": page_number}),
            ));
            warn!(page = page_number, "order_details_pagination_stalled");
            break;
        }

        let current_summary = read_summary(page, &summary_selector).await?;
        last_summary = current_summary.or(last_summary);

        if let Some(summary) = current_summary {
            if summary.end >= summary.total {
                on_event(PaginationEvent::new(
                    "order_details_pagination_complete",
                    serde_json::json!({"collected": blocks.len()}),
                ));
                break;
            }
        }

        if page_number >= max_pages {
            on_event(PaginationEvent::new(
                "order_details_pagination_stalled",
                serde_json::json!({"reason": "max_pages_reached", "page": page_number}),
            ));
            break;
        }

        let next_selector = selectors
            .order_next_button
            .last()
            .cloned()
            .unwrap_or_default();
        if !next_is_clickable(page, &next_selector).await? {
            on_event(PaginationEvent::new(
                "order_details_pagination_stalled",
                serde_json::json!({"reason": "next_not_clickable", "page": page_number}),
            ));
            break;
        }
        if page.click(&next_selector).await.is_err() {
            on_event(PaginationEvent::new(
                "order_details_pagination_stalled",
                serde_json::json!({"reason": "next_click_failed", "page": page_number}),
            ));
            break;
        }

        last_summary = wait_for_advance(
            page,
            clock,
            selectors,
            &summary_selector,
            current_summary,
            advance_timeout,
        )
        .await?
        .or(last_summary);
    }

    let collected = blocks.len() as u64;
    match last_summary {
        Some(summary) if collected == summary.total => {
            on_event(PaginationEvent::new(
                "order_details_pagination_verified",
                serde_json::json!({"collected": collected, "total": summary.total}),
            ));
        }
        Some(summary) => {
            on_event(PaginationEvent::new(
                "order_details_pagination_mismatch",
                serde_json::json!({"collected": collected, "total": summary.total}),
            ));
            warn!(collected, total = summary.total, "order_details_pagination_mismatch");
        }
        None => {}
    }

    Ok(OrderDetailsCrawlOutcome {
        blocks,
        pages_fetched: page_number,
        collected,
        last_summary,
    })
}

pub struct MenuSummaryCrawlOutcome {
    pub rows: Vec<MenuSummaryRow>,
    pub pages_fetched: u32,
}

/// Drives the Menu Item Summary pagination widget: same stall/signature/
/// termination rules as [`crawl_order_details`], but the row shape is a
/// flat label→value mapping instead of an order block (§4.6, final
/// paragraph).
pub async fn crawl_menu_summary(
    page: &dyn Page,
    clock: &dyn Clock,
    selectors: &OrderDetailsSelectors,
    advance_timeout: Duration,
    max_pages: u32,
    mut on_event: impl FnMut(PaginationEvent),
) -> PaginationResult<MenuSummaryCrawlOutcome> {
    let summary_selector = selectors
        .menu_summary_pagination_summary
        .first()
        .cloned()
        .unwrap_or_default();
    let row_selector = selectors.menu_summary_rows.first().cloned().unwrap_or_default();

    let mut rows = Vec::new();
    let mut seen_signatures: BTreeSet<String> = BTreeSet::new();
    let mut page_number = 0u32;

    loop {
        page_number += 1;
        let script = menu_summary_rows_script(&row_selector);
        let raw = page.evaluate(&script).await?;
        let extracted: Vec<ExtractedMenuRow> =
            serde_json::from_value(raw).map_err(|err| PaginationError::Malformed(err.to_string()))?;

        let mut page_keys = Vec::new();
        for row in &extracted {
            let key = row
                .fields
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .join("|");
            page_keys.push(key);
        }
        let page_added = extracted.len();
        rows.extend(extracted.into_iter().map(|row| MenuSummaryRow(row.fields)));

        on_event(PaginationEvent::new(
            "menu_summary_page_fetched",
            serde_json::json!({"page": page_number, "accepted": page_added}),
        ));
        info!(page = page_number, accepted = page_added, "menu_summary_page_fetched");

        let signature = page_signature(&page_keys);
        if !signature.is_empty() && !seen_signatures.insert(signature.clone()) {
            on_event(PaginationEvent::new(
                "menu_summary_pagination_stalled",
                serde_json::json!({"reason": "repeated_page_signature", "page": page_number}),
            ));
            break;
        }
        if page_added == 0 && page_number >= 2 {
            break;
        }

        let current_summary = read_summary(page, &summary_selector).await?;
        if let Some(summary) = current_summary {
            if summary.end >= summary.total {
                on_event(PaginationEvent::new("menu_summary_pagination_complete", serde_json::Value::Null));
                break;
            }
        }
        if page_number >= max_pages {
            break;
        }

        let next_selector = selectors.next_button.last().cloned().unwrap_or_default();
        if !next_is_clickable(page, &next_selector).await? {
            break;
        }
        if page.click(&next_selector).await.is_err() {
            break;
        }

        let _ = wait_for_advance(
            page,
            clock,
            selectors,
            &summary_selector,
            current_summary,
            advance_timeout,
        )
        .await?;
    }

    Ok(MenuSummaryCrawlOutcome {
        rows,
        pages_fetched: page_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkscrape_browser::FakeDomState;
    use checkscrape_browser::FakePage;
    use checkscrape_clock::FrozenClock;
    use checkscrape_config::SelectorDocument;
    use pretty_assertions::assert_eq;

    fn selectors() -> OrderDetailsSelectors {
        SelectorDocument::vendor_defaults().order_details
    }

    fn order_block_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "payment_id": id,
            "metadata": {},
            "payload": {
                "pairs": {}, "tables": [], "summary": {}, "summary_details": {},
                "body_text": "", "metadata": {}
            },
            "parsed_url": "https://reports.example.test/a"
        })
    }

    #[test]
    fn page_signature_takes_first_six_ids() {
        let ids: Vec<String> = (1..=10).map(|n| format!("p{n:03}")).collect();
        let sig = page_signature(&ids);
        assert_eq!(sig, "p001,p002,p003,p004,p005,p006");
    }

    #[tokio::test]
    async fn single_page_completes_when_summary_end_meets_total() {
        let selectors = selectors();
        let block_script = order_blocks_script(
            &selectors.order_blocks[0],
            &selectors.order_detail_meta_id[0],
        );
        let summary_script = pagination_summary_script(&selectors.pagination_summary[0]);

        let mut state = FakeDomState::default();
        state.evaluate_results.insert(
            block_script,
            serde_json::Value::Array((1..=20).map(|n| order_block_json(&format!("p{n:03}"))).collect()),
        );
        state
            .evaluate_results
            .insert(summary_script, serde_json::Value::String("Showing 1 through 20 of 20".into()));

        let page = FakePage::new(state);
        let clock = FrozenClock::new();
        let mut events = Vec::new();
        let outcome = crawl_order_details(
            &page,
            &clock,
            &selectors,
            Duration::from_secs(5),
            10,
            |event| events.push(event),
        )
        .await
        .expect("should crawl");

        assert_eq!(outcome.collected, 20);
        assert_eq!(outcome.pages_fetched, 1);
        assert!(events.iter().any(|e| e.event == "order_details_pagination_complete"));
        assert!(events.iter().any(|e| e.event == "order_details_pagination_verified"));
    }

    #[tokio::test]
    async fn repeated_signature_stalls_the_crawl() {
        let selectors = selectors();
        let block_script = order_blocks_script(
            &selectors.order_blocks[0],
            &selectors.order_detail_meta_id[0],
        );
        let summary_script = pagination_summary_script(&selectors.pagination_summary[0]);
        let next_script = next_clickable_script(selectors.order_next_button.last().unwrap());

        let mut state = FakeDomState::default();
        state.evaluate_results.insert(
            block_script,
            serde_json::Value::Array((1..=20).map(|n| order_block_json(&format!("p{n:03}"))).collect()),
        );
        state
            .evaluate_results
            .insert(summary_script, serde_json::Value::String("Showing 1 through 20 of 40".into()));
        state.evaluate_results.insert(next_script, serde_json::Value::Bool(true));
        state.present_selectors = vec![selectors.order_next_button.last().unwrap().clone()];

        let page = FakePage::new(state);
        let clock = FrozenClock::new();
        let mut events = Vec::new();
        let outcome = crawl_order_details(
            &page,
            &clock,
            &selectors,
            Duration::from_millis(50),
            10,
            |event| events.push(event),
        )
        .await
        .expect("should crawl");

        // Same 20 blocks and same summary repeat every page since the fake
        // page never advances its queued state; the signature guard must
        // stop the loop rather than spin forever.
        assert_eq!(outcome.pages_fetched, 2);
        assert!(events.iter().any(|e| e.event == "order_details_pagination_stalled"
            && e.fields["reason"] == "repeated_page_signature"));
    }
}
