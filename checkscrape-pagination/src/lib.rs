//! Pagination engine (§4.6): order-block and menu-summary-row extraction,
//! the anti-loop page-signature guard, and the Next-click/settle loop
//! against the *last* pagination widget on the Order Details tab.

mod blocks;
mod engine;
mod summary;

pub use blocks::ExtractedMenuRow;
pub use blocks::ExtractedOrderBlock;
pub use blocks::menu_summary_rows_script;
pub use blocks::next_clickable_script;
pub use blocks::order_blocks_script;
pub use blocks::pagination_summary_script;
pub use engine::MenuSummaryCrawlOutcome;
pub use engine::OrderDetailsCrawlOutcome;
pub use engine::PaginationError;
pub use engine::PaginationEvent;
pub use engine::PaginationResult;
pub use engine::crawl_menu_summary;
pub use engine::crawl_order_details;
pub use engine::page_signature;
pub use summary::PaginationSummary;
pub use summary::parse_summary;
