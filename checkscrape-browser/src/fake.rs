use std::collections::BTreeMap;
use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::BrowserError;
use crate::error::BrowserResult;
use crate::page::Page;

/// A scripted DOM state the fake replays: the current URL, the HTML the
/// page would render, and the set of selectors currently present.
#[derive(Debug, Clone, Default)]
pub struct FakeDomState {
    pub url: String,
    pub html: String,
    pub present_selectors: Vec<String>,
    pub evaluate_results: BTreeMap<String, serde_json::Value>,
}

/// In-memory [`Page`] double that replays a queue of [`FakeDomState`]
/// snapshots, advancing one snapshot per `navigate`/`click` call that the
/// test script designates as a transition point. Exists purely for tests
/// exercising §8's scenarios without touching a real browser.
pub struct FakePage {
    states: Mutex<VecDeque<FakeDomState>>,
    current: Mutex<FakeDomState>,
    clicked: Mutex<Vec<String>>,
    filled: Mutex<Vec<(String, String)>>,
}

impl FakePage {
    #[must_use]
    pub fn new(initial: FakeDomState) -> Self {
        Self {
            states: Mutex::new(VecDeque::new()),
            current: Mutex::new(initial),
            clicked: Mutex::new(Vec::new()),
            filled: Mutex::new(Vec::new()),
        }
    }

    /// Queues a state to transition into on the next `navigate` or `click`
    /// against a selector not present in the current state.
    pub async fn queue_state(&self, state: FakeDomState) {
        self.states.lock().await.push_back(state);
    }

    pub async fn clicked_selectors(&self) -> Vec<String> {
        self.clicked.lock().await.clone()
    }

    pub async fn filled_values(&self) -> Vec<(String, String)> {
        self.filled.lock().await.clone()
    }

    async fn advance_if_available(&self) {
        let mut states = self.states.lock().await;
        if let Some(next) = states.pop_front() {
            *self.current.lock().await = next;
        }
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.advance_if_available().await;
        self.current.lock().await.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.current.lock().await.url.clone())
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let current = self.current.lock().await;
        Ok(current
            .evaluate_results
            .get(script)
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let present = self.current.lock().await.present_selectors.contains(&selector.to_string());
        if !present {
            return Err(BrowserError::DomShapeMismatch {
                family: selector.to_string(),
            });
        }
        self.clicked.lock().await.push(selector.to_string());
        self.advance_if_available().await;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        let present = self.current.lock().await.present_selectors.contains(&selector.to_string());
        if !present {
            return Err(BrowserError::DomShapeMismatch {
                family: selector.to_string(),
            });
        }
        self.filled.lock().await.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout_secs: u64) -> BrowserResult<bool> {
        Ok(self.current.lock().await.present_selectors.contains(&selector.to_string()))
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn html(&self) -> BrowserResult<String> {
        Ok(self.current.lock().await.html.clone())
    }

    async fn cookies(&self) -> BrowserResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}
