use thiserror::Error;

/// Crate-boundary error taxonomy (§7), composed from each module's own
/// enum rather than flattened into one monolithic type. `AuthBlocked` is
/// pulled out of [`checkscrape_auth::AuthError`] so the restart loop in
/// [`crate::orchestrator`] can match on it without reaching into a nested
/// variant.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("AUTH_BLOCKED: {reason}")]
    AuthBlocked { reason: String },
    #[error(transparent)]
    Auth(#[from] checkscrape_auth::AuthError),
    #[error(transparent)]
    Browser(#[from] checkscrape_browser::BrowserError),
    #[error(transparent)]
    Report(#[from] checkscrape_report::ReportError),
    #[error(transparent)]
    Pagination(#[from] checkscrape_pagination::PaginationError),
    #[error(transparent)]
    State(#[from] checkscrape_state::StateStoreError),
    #[error(transparent)]
    Config(#[from] checkscrape_config::ConfigError),
    #[error("irrecoverable failure: {0}")]
    Fatal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
