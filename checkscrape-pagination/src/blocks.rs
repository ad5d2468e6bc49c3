use std::collections::BTreeMap;

use checkscrape_parser::DetailPayload;
use serde::Deserialize;

/// One `.order-border` block as extracted from the DOM (§4.6 step 1).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedOrderBlock {
    pub payment_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub payload: DetailPayload,
    pub parsed_url: String,
}

/// One flat label→value row from the Menu Item Summary table.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedMenuRow {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Builds the order-block extraction script for one page (§4.6 step 1).
///
/// `payment_id` is derived from the reopen-check form's `id=` query
/// parameter, falling back to the `.order-detail-meta-id` "ID: …" label,
/// finally an order-number-based surrogate; blocks with no resolvable id
/// are dropped by the caller rather than by the script itself, so a
/// malformed block still surfaces as a `DomShapeMismatch` the orchestrator
/// can log instead of silently vanishing.
#[must_use]
pub fn order_blocks_script(block_selector: &str, meta_id_selector: &str) -> String {
    format!(
        "(function(){{
            function paymentIdFor(block) {{
                const form = block.querySelector(\"form[action*='reopen']\");
                if (form) {{
                    const action = form.getAttribute('action') || '';
                    const match = action.match(/[?&]id=([^&]+)/);
                    if (match) return decodeURIComponent(match[1]);
                }}
                const metaId = block.querySelector('{meta_id_selector}');
                if (metaId) {{
                    const match = (metaId.textContent || '').match(/ID:\\s*([\\w-]+)/);
                    if (match) return match[1];
                }}
                const orderNumber = block.querySelector('.order-number');
                return orderNumber ? 'order-' + orderNumber.textContent.trim() : null;
            }}
            function pairsFor(block) {{
                const pairs = {{}};
                block.querySelectorAll('.order-detail-pair').forEach(function(el) {{
                    const label = el.querySelector('.label');
                    const value = el.querySelector('.value');
                    if (label && value) pairs[label.textContent.trim()] = value.textContent.trim();
                }});
                return pairs;
            }}
            function metadataFor(block) {{
                const metadata = {{}};
                block.querySelectorAll('.order-meta-row').forEach(function(el) {{
                    const label = el.querySelector('.meta-label');
                    const value = el.querySelector('.meta-value');
                    if (label && value) metadata[label.textContent.trim()] = value.textContent.trim();
                }});
                return metadata;
            }}
            function tablesFor(block) {{
                return Array.from(block.querySelectorAll('table')).map(function(table) {{
                    const headers = Array.from(table.querySelectorAll('thead th')).map(function(th) {{ return th.textContent.trim(); }});
                    const rows = Array.from(table.querySelectorAll('tbody tr')).map(function(tr) {{
                        return Array.from(tr.querySelectorAll('td')).map(function(td) {{ return td.textContent.trim(); }});
                    }});
                    return {{ headers: headers, rows: rows }};
                }});
            }}
            function summaryFor(block) {{
                const summary = {{}};
                block.querySelectorAll('[data-summary-field]').forEach(function(el) {{
                    summary[el.getAttribute('data-summary-field')] = el.textContent.trim();
                }});
                return summary;
            }}
            function summaryDetailsFor(block) {{
                const details = {{}};
                block.querySelectorAll('.check-server-details .detail-line').forEach(function(el) {{
                    const label = el.querySelector('.detail-label');
                    const value = el.querySelector('.detail-value');
                    if (label && value) details[label.textContent.trim()] = value.textContent.trim();
                }});
                return details;
            }}
            return Array.from(document.querySelectorAll('{block_selector}')).map(function(block) {{
                const metadata = metadataFor(block);
                return {{
                    payment_id: paymentIdFor(block),
                    metadata: metadata,
                    payload: {{
                        pairs: pairsFor(block),
                        tables: tablesFor(block),
                        summary: summaryFor(block),
                        summary_details: summaryDetailsFor(block),
                        body_text: block.textContent || '',
                        metadata: metadata
                    }},
                    parsed_url: window.location.href
                }};
            }});
        }})()"
    )
}

/// Builds the Menu Item Summary row-extraction script for one page: every
/// row is a flat label→value mapping, keyed by the header cell text.
#[must_use]
pub fn menu_summary_rows_script(row_selector: &str) -> String {
    format!(
        "(function(){{
            const table = document.querySelector('{row_selector}') ? document.querySelector('{row_selector}').closest('table') : null;
            const headers = table ? Array.from(table.querySelectorAll('thead th')).map(function(th) {{ return th.textContent.trim(); }}) : [];
            return Array.from(document.querySelectorAll('{row_selector}')).map(function(row) {{
                const cells = Array.from(row.querySelectorAll('td')).map(function(td) {{ return td.textContent.trim(); }});
                const fields = {{}};
                cells.forEach(function(value, index) {{
                    const label = headers[index] || ('column_' + index);
                    fields[label] = value;
                }});
                return {{ fields: fields }};
            }});
        }})()"
    )
}

/// Builds the last-`.pagination-summary` read script.
#[must_use]
pub fn pagination_summary_script(summary_selector: &str) -> String {
    format!(
        "(function(){{
            const nodes = document.querySelectorAll('{summary_selector}');
            if (nodes.length === 0) return null;
            return nodes[nodes.length - 1].textContent.trim();
        }})()"
    )
}

/// Builds a script that reports whether the last pagination's `li.next` is
/// clickable: present, not `.disabled`, and its anchor visible.
#[must_use]
pub fn next_clickable_script(next_button_selector: &str) -> String {
    format!(
        "(function(){{
            const nodes = document.querySelectorAll('{next_button_selector}');
            if (nodes.length === 0) return false;
            const anchor = nodes[nodes.length - 1];
            const li = anchor.closest('li');
            if (li && li.classList.contains('disabled')) return false;
            const rect = anchor.getBoundingClientRect();
            return rect.width > 0 && rect.height > 0;
        }})()"
    )
}
