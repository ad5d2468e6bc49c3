use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::Browser;
use chromiumoxide::BrowserConfig;
use chromiumoxide::Page as CdpPage;
use futures::StreamExt;

use crate::error::BrowserError;
use crate::error::BrowserResult;
use crate::page::Page;

/// Init script removing the automation webdriver flag (§4.3): most CDN
/// challenge implementations probe `navigator.webdriver` first.
const REMOVE_WEBDRIVER_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
";

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const LOCK_FILE_NAMES: &[&str] = &["SingletonLock", "lockfile"];

fn profile_locked(profile_dir: &Path) -> bool {
    LOCK_FILE_NAMES
        .iter()
        .any(|name| profile_dir.join(name).exists())
}

/// Owns a persistent profile directory and a single [`Page`]. Startup is
/// gated by a profile-lock check, which surfaces `ProfileLocked` as a
/// distinct, non-recoverable-in-process error rather than hanging on a CDP
/// connect that will never succeed.
pub struct BrowserSession {
    browser: Browser,
    profile_dir: PathBuf,
}

impl BrowserSession {
    pub async fn launch(profile_dir: impl Into<PathBuf>, headless: bool) -> BrowserResult<Self> {
        let profile_dir = profile_dir.into();
        if profile_locked(&profile_dir) {
            return Err(BrowserError::ProfileLocked(profile_dir.display().to_string()));
        }

        let mut builder = BrowserConfig::builder().user_data_dir(&profile_dir);
        if headless {
            builder = builder.user_agent(DESKTOP_USER_AGENT);
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|err| BrowserError::LaunchFailed(err.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::LaunchFailed(err.to_string()))?;

        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self { browser, profile_dir })
    }

    /// A `reqwest` client seeded with the page's current cookie jar, for
    /// direct HTTP calls that should ride the same authenticated session as
    /// the browser (§4.3). Built fresh from whatever cookies the page holds
    /// at call time rather than kept live, since chromiumoxide's jar can
    /// change underneath a long-lived client.
    pub async fn cookie_client(&self, page: &ChromiumPage, base_url: &str) -> BrowserResult<reqwest::Client> {
        let cookies = page.cookies().await?;
        let url = base_url
            .parse::<reqwest::Url>()
            .map_err(|err| BrowserError::LaunchFailed(err.to_string()))?;
        let jar = reqwest::cookie::Jar::default();
        for (name, value) in cookies {
            jar.add_cookie_str(&format!("{name}={value}"), &url);
        }
        reqwest::Client::builder()
            .cookie_provider(std::sync::Arc::new(jar))
            .user_agent(DESKTOP_USER_AGENT)
            .build()
            .map_err(|err| BrowserError::LaunchFailed(err.to_string()))
    }

    pub async fn new_page(&self, url: &str) -> BrowserResult<ChromiumPage> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        page.evaluate(REMOVE_WEBDRIVER_SCRIPT)
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        Ok(ChromiumPage { page })
    }

    #[must_use]
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub async fn close(mut self) -> BrowserResult<()> {
        self.browser
            .close()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        Ok(())
    }
}

/// Chrome-DevTools-Protocol-backed [`Page`] implementation.
pub struct ChromiumPage {
    page: CdpPage,
}

#[async_trait::async_trait]
impl Page for ChromiumPage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        self.page
            .url()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?
            .ok_or_else(|| BrowserError::Cdp("page has no URL".to_string()))
    }

    async fn evaluate(&self, script: &str) -> BrowserResult<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|err| BrowserError::ScriptFailed(err.to_string()))?;
        result
            .into_value()
            .map_err(|err| BrowserError::ScriptFailed(err.to_string()))
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::DomShapeMismatch {
                family: selector.to_string(),
            })?;
        element
            .click()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::DomShapeMismatch {
                family: selector.to_string(),
            })?;
        element
            .click()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        element
            .type_str(value)
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout_secs: u64) -> BrowserResult<bool> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        Ok(false)
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        self.page
            .screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))
    }

    async fn html(&self) -> BrowserResult<String> {
        self.page
            .content()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))
    }

    async fn cookies(&self) -> BrowserResult<Vec<(String, String)>> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|err| BrowserError::Cdp(err.to_string()))?;
        Ok(cookies.into_iter().map(|c| (c.name, c.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn profile_locked_detects_singleton_lock_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!profile_locked(dir.path()));
        std::fs::write(dir.path().join("SingletonLock"), b"").expect("write lock");
        assert!(profile_locked(dir.path()));
    }
}
