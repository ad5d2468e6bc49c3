use async_trait::async_trait;

use crate::error::BrowserResult;

/// The narrow surface the rest of the core depends on (§4.3): navigate,
/// evaluate a script, click, fill, wait for a selector, screenshot, read
/// the current URL, and read cookies. The concrete implementation drives a
/// real browser over the Chrome DevTools Protocol; a second, in-memory
/// implementation exists purely for tests.
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;
    async fn current_url(&self) -> BrowserResult<String>;
    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value>;
    async fn click(&self, selector: &str) -> BrowserResult<()>;
    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()>;
    async fn wait_for_selector(&self, selector: &str, timeout_secs: u64) -> BrowserResult<bool>;
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;
    async fn html(&self) -> BrowserResult<String>;
    async fn cookies(&self) -> BrowserResult<Vec<(String, String)>>;
}
