use thiserror::Error;

/// Browser-session error taxonomy (§7). `ProfileLocked` is surfaced
/// immediately and is not recoverable in-process; the others are ordinary
/// navigation/DOM failures the caller classifies and reacts to.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("profile directory {0} is locked by another browser instance")]
    ProfileLocked(String),
    #[error("navigation to {url} timed out after {timeout_secs}s")]
    NavigationTimeout { url: String, timeout_secs: u64 },
    #[error("selector family {family} found no visible node")]
    DomShapeMismatch { family: String },
    #[error("script evaluation failed: {0}")]
    ScriptFailed(String),
    #[error("launch failed: {0}")]
    LaunchFailed(String),
    #[error("chromiumoxide error: {0}")]
    Cdp(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
