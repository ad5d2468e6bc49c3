//! Report driver (§4.5): date-range selection, per-page sizing, and tab
//! switching on the admin reports page.

use checkscrape_browser::Page;
use checkscrape_config::OrderDetailsSelectors;
use checkscrape_config::PaymentsSelectors;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("browser error: {0}")]
    Browser(#[from] checkscrape_browser::BrowserError),
    #[error("no visible node for selector family {0}")]
    DomShapeMismatch(&'static str),
}

pub type ReportResult<T> = Result<T, ReportError>;

/// MM-DD-YYYY, the visible input format (§6.1).
fn format_visible(date: NaiveDate) -> String {
    date.format("%m-%d-%Y").to_string()
}

/// M/D/YY, no leading zeros, two-digit year — the legacy hidden input
/// format (§6.1).
fn format_hidden(date: NaiveDate) -> String {
    use chrono::Datelike;
    format!(
        "{}/{}/{:02}",
        date.month(),
        date.day(),
        date.year().rem_euclid(100)
    )
}

async fn first_present<'a>(page: &dyn Page, family: &'a [String]) -> ReportResult<Option<&'a str>> {
    for selector in family {
        if page.wait_for_selector(selector, 0).await? {
            return Ok(Some(selector.as_str()));
        }
    }
    Ok(None)
}

/// Snapshot of what the report driver believes it just set, re-read after
/// the Apply click settles, so a "0 rows" regression can be diagnosed from
/// the event log alone (§4.5 supplement). Emitted as the `date_range_values`
/// event.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRangeValues {
    pub visible_start: String,
    pub visible_end: String,
    pub hidden_start: String,
    pub hidden_end: String,
}

/// Opens the date-range dropdown and selects "Custom Date", waiting for the
/// custom-range inputs to become visible before returning (§4.5 step a/b).
pub async fn select_custom_date_range(
    page: &dyn Page,
    selectors: &PaymentsSelectors,
) -> ReportResult<()> {
    let dropdown_selector = first_present(page, &selectors.date_range_dropdown).await?;
    if let Some(dropdown_selector) = dropdown_selector {
        let script = format!(
            "(function(){{
                const el = document.querySelector('{dropdown_selector}');
                if (!el) return false;
                el.value = 'custom';
                el.dispatchEvent(new Event('change'));
                return true;
            }})()"
        );
        let applied = page.evaluate(&script).await?.as_bool().unwrap_or(false);
        if !applied {
            let option_selector = first_present(page, &selectors.custom_date_option)
                .await?
                .ok_or(ReportError::DomShapeMismatch(
                    "payments.custom_date_option",
                ))?;
            page.click(option_selector).await?;
        }
    }

    if page
        .wait_for_selector(&selectors.date_start_input[0], 5)
        .await
        .unwrap_or(false)
    {
        return Ok(());
    }
    Err(ReportError::DomShapeMismatch("payments.date_start_input"))
}

/// Fills both the visible MM-DD-YYYY inputs and the legacy hidden M/D/YY
/// inputs, clicks Apply, waits for the settle signal, then re-reads every
/// value it just set and emits a `date_range_values` diagnostic event — the
/// contract that lets a "0 rows" regression be diagnosed from the event log
/// alone (§4.5, §9).
pub async fn set_date_range(
    page: &dyn Page,
    selectors: &PaymentsSelectors,
    start: NaiveDate,
    end: NaiveDate,
) -> ReportResult<DateRangeValues> {
    select_custom_date_range(page, selectors).await?;

    let visible_start = format_visible(start);
    let visible_end = format_visible(end);
    let hidden_start = format_hidden(start);
    let hidden_end = format_hidden(end);

    let start_selector = first_present(page, &selectors.date_start_input)
        .await?
        .ok_or(ReportError::DomShapeMismatch("payments.date_start_input"))?;
    page.fill(start_selector, &visible_start).await?;

    let end_selector = first_present(page, &selectors.date_end_input)
        .await?
        .ok_or(ReportError::DomShapeMismatch("payments.date_end_input"))?;
    page.fill(end_selector, &visible_end).await?;

    let set_hidden_script = format!(
        "(function(){{
            const s = document.querySelector('#startDate');
            const e = document.querySelector('#endDate');
            if (s) {{ s.value = '{hidden_start}'; s.dispatchEvent(new Event('input')); s.dispatchEvent(new Event('change')); }}
            if (e) {{ e.value = '{hidden_end}'; e.dispatchEvent(new Event('input')); e.dispatchEvent(new Event('change')); }}
            return true;
        }})()"
    );
    page.evaluate(&set_hidden_script).await?;

    let apply_selector = first_present(page, &selectors.apply_button)
        .await?
        .ok_or(ReportError::DomShapeMismatch("payments.apply_button"))?;
    page.click(apply_selector).await?;

    // Re-read what the report actually thinks it's using, post-settle.
    // Diagnoses "0 rows" regressions from the event log alone (§9).
    let readback_script = "(function(){
        const s = document.querySelector('#startDate');
        const e = document.querySelector('#endDate');
        return { hidden_start: s ? s.value : null, hidden_end: e ? e.value : null };
    })()";
    let readback = page.evaluate(readback_script).await.unwrap_or(serde_json::Value::Null);
    let observed_hidden_start = readback
        .get("hidden_start")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| hidden_start.clone());
    let observed_hidden_end = readback
        .get("hidden_end")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| hidden_end.clone());

    let values = DateRangeValues {
        visible_start,
        visible_end,
        hidden_start: observed_hidden_start,
        hidden_end: observed_hidden_end,
    };
    info!(
        visible_start = %values.visible_start,
        visible_end = %values.visible_end,
        hidden_start = %values.hidden_start,
        hidden_end = %values.hidden_end,
        "date_range_values"
    );
    Ok(values)
}

/// Prefers programmatic assignment of the underlying `<select>`; falls
/// back to clicking a "100" option in a custom dropdown (§4.5).
pub async fn set_per_page_100(page: &dyn Page, selectors: &OrderDetailsSelectors) -> ReportResult<()> {
    if let Some(select_selector) = first_present(page, &selectors.per_page_select).await? {
        let script = format!(
            "(function(){{
                const el = document.querySelector('{select_selector}');
                if (!el) return false;
                el.value = '100';
                el.dispatchEvent(new Event('change'));
                return true;
            }})()"
        );
        let result = page.evaluate(&script).await?;
        if result.as_bool().unwrap_or(false) {
            return Ok(());
        }
    }
    let option_selector = first_present(page, &selectors.per_page_100_option)
        .await?
        .ok_or(ReportError::DomShapeMismatch(
            "order_details.per_page_100_option",
        ))?;
    page.click(option_selector).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTab {
    Payments,
    OrderDetails,
}

/// Clicks the tab link only when the corresponding pane isn't already
/// active, so repeat calls within a run are idempotent.
pub async fn switch_tab(
    page: &dyn Page,
    selectors: &OrderDetailsSelectors,
    tab: ReportTab,
    already_active: bool,
) -> ReportResult<()> {
    if already_active {
        return Ok(());
    }
    match tab {
        ReportTab::OrderDetails => {
            let selector = first_present(page, &selectors.tab_link)
                .await?
                .ok_or(ReportError::DomShapeMismatch("order_details.tab_link"))?;
            page.click(selector).await
        }
        ReportTab::Payments => Ok(()),
    }
}
