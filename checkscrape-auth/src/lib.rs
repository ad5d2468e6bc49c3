//! Auth gate state machine (§4.4): Unauthenticated → [Challenged] →
//! Credentialing → DismissingPrompts → Authenticated, or Blocked.

use std::time::Duration;

use checkscrape_browser::Page;
use checkscrape_clock::Clock;
use checkscrape_config::AuthSelectors;
use checkscrape_config::ChallengeMarkers;
use thiserror::Error;
use tracing::info;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Challenged,
    Credentialing,
    DismissingPrompts,
    Authenticated,
    Blocked,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("AUTH_BLOCKED: {reason}")]
    Blocked { reason: String },
    #[error("browser error: {0}")]
    Browser(#[from] checkscrape_browser::BrowserError),
    #[error("manual fallback required but not allowed")]
    ManualFallbackDisallowed,
}

pub type AuthResult<T> = Result<T, AuthError>;

/// A captured debug artifact: screenshot bytes, page HTML, and a small
/// structural summary of which selector families were visible at capture
/// time — written on entry to `Blocked` so operators can diagnose why a
/// challenge never cleared (§4.4 supplement).
#[derive(Debug, Clone)]
pub struct DebugArtifact {
    pub screenshot: Vec<u8>,
    pub html: String,
    pub visible_markers: Vec<String>,
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct AuthGateConfig<'a> {
    pub selectors: &'a AuthSelectors,
    pub challenge: &'a ChallengeMarkers,
    pub credentials: Option<Credentials>,
    pub allow_manual_fallback: bool,
    pub challenge_timeout: Duration,
    pub auth_timeout: Duration,
    pub max_attempts: u32,
}

/// Returns the first family member the page reports present, if any.
async fn first_present(page: &dyn Page, family: &[String]) -> AuthResult<Option<String>> {
    for selector in family {
        if page.wait_for_selector(selector, 0).await? {
            return Ok(Some(selector.clone()));
        }
    }
    Ok(None)
}

async fn challenge_markers_present(
    page: &dyn Page,
    markers: &ChallengeMarkers,
) -> AuthResult<bool> {
    if let Some(selector) = first_present(page, &markers.marker_selectors).await? {
        warn!(selector = %selector, "challenge marker selector present");
        return Ok(true);
    }
    let html = page.html().await?;
    let lowered = html.to_lowercase();
    if markers
        .title_substrings
        .iter()
        .any(|needle| lowered.contains(&needle.to_lowercase()))
    {
        return Ok(true);
    }
    if markers
        .marker_texts
        .iter()
        .any(|needle| lowered.contains(&needle.to_lowercase()))
    {
        return Ok(true);
    }
    Ok(false)
}

async fn capture_debug_artifact(
    page: &dyn Page,
    challenge: &ChallengeMarkers,
) -> AuthResult<DebugArtifact> {
    let screenshot = page.screenshot().await.unwrap_or_default();
    let html = page.html().await.unwrap_or_default();
    let mut visible_markers = Vec::new();
    for selector in &challenge.marker_selectors {
        if page.wait_for_selector(selector, 0).await.unwrap_or(false) {
            visible_markers.push(selector.clone());
        }
    }
    Ok(DebugArtifact {
        screenshot,
        html,
        visible_markers,
    })
}

/// Drives the state machine to completion: `Authenticated` on success, or
/// `AuthError::Blocked` (with the debug artifact attached via the `on_block`
/// callback) when the challenge never clears or credentials are exhausted.
pub async fn run(
    page: &dyn Page,
    clock: &dyn Clock,
    config: &AuthGateConfig<'_>,
    mut on_block: impl FnMut(DebugArtifact),
) -> AuthResult<AuthState> {
    let mut state = AuthState::Unauthenticated;

    if challenge_markers_present(page, config.challenge).await? {
        state = AuthState::Challenged;
        info!("auth_challenge_detected");
        let deadline = clock.now() + config.challenge_timeout;
        loop {
            if !challenge_markers_present(page, config.challenge).await? {
                state = AuthState::Unauthenticated;
                break;
            }
            if clock.now() >= deadline {
                state = AuthState::Blocked;
                warn!(?state, "challenge_timeout");
                let artifact = capture_debug_artifact(page, config.challenge).await?;
                on_block(artifact);
                return Err(AuthError::Blocked {
                    reason: "challenge did not clear before timeout".to_string(),
                });
            }
            clock.sleep(Duration::from_millis(500)).await;
        }
    }

    if authenticated(page, config.selectors).await? {
        return Ok(AuthState::Authenticated);
    }

    let Some(credentials) = &config.credentials else {
        if config.allow_manual_fallback {
            return Ok(AuthState::Unauthenticated);
        }
        return Err(AuthError::ManualFallbackDisallowed);
    };

    for attempt in 1..=config.max_attempts {
        state = AuthState::Credentialing;
        info!(attempt, ?state, "auth_attempt_start");
        if let Some(selector) = first_present(page, &config.selectors.username_inputs).await? {
            page.fill(&selector, &credentials.username).await?;
        }
        if let Some(selector) = first_present(page, &config.selectors.submit_buttons).await? {
            page.click(&selector).await?;
        }
        if let Some(selector) = first_present(page, &config.selectors.password_inputs).await? {
            page.fill(&selector, &credentials.password).await?;
        }
        if let Some(selector) = first_present(page, &config.selectors.submit_buttons).await? {
            page.click(&selector).await?;
        }

        if poll_authenticated(page, clock, config.selectors, config.auth_timeout).await? {
            return Ok(AuthState::Authenticated);
        }

        state = AuthState::DismissingPrompts;
        if let Some(selector) = first_present(page, &config.selectors.not_now_buttons).await? {
            page.click(&selector).await?;
            if poll_authenticated(page, clock, config.selectors, config.auth_timeout).await? {
                return Ok(AuthState::Authenticated);
            }
        }

        info!(attempt, ?state, "auth attempt did not reach authenticated state");
    }

    state = AuthState::Blocked;
    warn!(?state, "auth_attempt_error");
    let artifact = capture_debug_artifact(page, config.challenge).await?;
    on_block(artifact);
    Err(AuthError::Blocked {
        reason: format!("authentication failed after {} attempts", config.max_attempts),
    })
}

async fn authenticated(page: &dyn Page, selectors: &AuthSelectors) -> AuthResult<bool> {
    if first_present(page, &selectors.logged_out_markers).await?.is_some() {
        return Ok(false);
    }
    Ok(first_present(page, &selectors.authenticated_markers).await?.is_some())
}

async fn poll_authenticated(
    page: &dyn Page,
    clock: &dyn Clock,
    selectors: &AuthSelectors,
    timeout: Duration,
) -> AuthResult<bool> {
    let deadline = clock.now() + timeout;
    loop {
        if authenticated(page, selectors).await? {
            return Ok(true);
        }
        if clock.now() >= deadline {
            return Ok(false);
        }
        clock.sleep(Duration::from_millis(300)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkscrape_browser::FakeDomState;
    use checkscrape_browser::FakePage;
    use checkscrape_clock::FrozenClock;
    use checkscrape_config::SelectorDocument;
    use pretty_assertions::assert_eq;

    fn selectors() -> SelectorDocument {
        SelectorDocument::vendor_defaults()
    }

    #[tokio::test]
    async fn already_authenticated_page_short_circuits() {
        let document = selectors();
        let page = FakePage::new(FakeDomState {
            present_selectors: vec![".dashboard-root".to_string()],
            ..Default::default()
        });
        let clock = FrozenClock::new();
        let config = AuthGateConfig {
            selectors: &document.auth,
            challenge: &document.challenge,
            credentials: None,
            allow_manual_fallback: false,
            challenge_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(1),
            max_attempts: 1,
        };
        let state = run(&page, &clock, &config, |_| {}).await.expect("should authenticate");
        assert_eq!(state, AuthState::Authenticated);
    }

    #[tokio::test]
    async fn credential_flow_reaches_authenticated_after_submit() {
        let document = selectors();
        let page = FakePage::new(FakeDomState {
            present_selectors: vec![
                "input[name='username']".to_string(),
                "button[type='submit']".to_string(),
            ],
            ..Default::default()
        });
        page.queue_state(FakeDomState {
            present_selectors: vec![
                "input[name='password']".to_string(),
                "button[type='submit']".to_string(),
            ],
            ..Default::default()
        })
        .await;
        page.queue_state(FakeDomState {
            present_selectors: vec![".dashboard-root".to_string()],
            ..Default::default()
        })
        .await;

        let clock = FrozenClock::new();
        let config = AuthGateConfig {
            selectors: &document.auth,
            challenge: &document.challenge,
            credentials: Some(Credentials {
                username: "operator".to_string(),
                password: "hunter2".to_string(),
            }),
            allow_manual_fallback: false,
            challenge_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(1),
            max_attempts: 1,
        };
        let state = run(&page, &clock, &config, |_| {}).await.expect("should authenticate");
        assert_eq!(state, AuthState::Authenticated);
        assert_eq!(page.filled_values().await.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_yield_blocked_with_artifact() {
        let document = selectors();
        let page = FakePage::new(FakeDomState {
            present_selectors: vec![
                "input[name='username']".to_string(),
                "input[name='password']".to_string(),
                "button[type='submit']".to_string(),
            ],
            ..Default::default()
        });
        let clock = FrozenClock::new();
        let config = AuthGateConfig {
            selectors: &document.auth,
            challenge: &document.challenge,
            credentials: Some(Credentials {
                username: "operator".to_string(),
                password: "wrong".to_string(),
            }),
            allow_manual_fallback: false,
            challenge_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(1),
            max_attempts: 2,
        };
        let mut captured = None;
        let err = run(&page, &clock, &config, |artifact| captured = Some(artifact))
            .await
            .expect_err("should block");
        assert!(matches!(err, AuthError::Blocked { .. }));
        assert!(captured.is_some());
    }

    #[tokio::test]
    async fn no_credentials_without_manual_fallback_errors() {
        let document = selectors();
        let page = FakePage::new(FakeDomState::default());
        let clock = FrozenClock::new();
        let config = AuthGateConfig {
            selectors: &document.auth,
            challenge: &document.challenge,
            credentials: None,
            allow_manual_fallback: false,
            challenge_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(1),
            max_attempts: 1,
        };
        let err = run(&page, &clock, &config, |_| {}).await.expect_err("should fail fast");
        assert!(matches!(err, AuthError::ManualFallbackDisallowed));
    }
}
