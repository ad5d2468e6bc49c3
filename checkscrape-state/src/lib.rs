#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Canonical data model plus atomic persistence of the per-day record map,
//! menu summary, progress snapshot, and append-only error log.
//!
//! Writes go through a sibling temp file and `rename`, so a reader never
//! observes a partially written state file: either the previous snapshot or
//! the new one, never a truncated one.

mod envelope;
mod filesystem;
mod memory;
mod model;

pub use envelope::DayEnvelope;
pub use filesystem::FileStateStore;
pub use memory::InMemoryStateStore;
pub use model::CheckDetail;
pub use model::CheckRecord;
pub use model::Discount;
pub use model::ErrorEvent;
pub use model::LineItem;
pub use model::MenuSummaryRow;
pub use model::Payment;
pub use model::ProgressSnapshot;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub type StateResult<T> = Result<T, StateStoreError>;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse state file {path}: {source}")]
    Deserialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Payment identifier → record map; the in-memory mirror of the state file.
pub type StateMap = BTreeMap<String, CheckRecord>;

/// Persistence contract for the per-day record map, menu summary, progress
/// snapshot and error log. A filesystem implementation
/// ([`FileStateStore`]) and an in-memory test double
/// ([`InMemoryStateStore`]) both implement this so the orchestrator can be
/// exercised without touching disk.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the current state map. A missing file yields an empty map.
    async fn load(&self) -> StateResult<StateMap>;

    /// Writes the full state atomically. Records are serialized in
    /// payment-id order for stable diffs.
    async fn save(&self, state: &StateMap) -> StateResult<()>;

    async fn load_progress(&self) -> StateResult<Option<ProgressSnapshot>>;

    /// Rewrites the small progress document atomically.
    async fn save_progress(&self, state: &StateMap, run_id: &str) -> StateResult<()>;

    /// Appends one JSON line to the error log. Never rewrites prior lines.
    async fn append_error(&self, event: &ErrorEvent) -> StateResult<()>;

    async fn load_menu_summary(&self) -> StateResult<Vec<MenuSummaryRow>>;

    /// Overwrites the menu summary file atomically.
    async fn save_menu_summary(&self, rows: &[MenuSummaryRow]) -> StateResult<()>;

    /// Reads current state, menu summary, and progress off of storage and
    /// assembles the day's terminal artifact.
    async fn build_envelope(&self, business_date: &str) -> StateResult<DayEnvelope> {
        let state = self.load().await?;
        let menu_items_summary = self.load_menu_summary().await?;
        let progress = self.load_progress().await?.unwrap_or_else(|| {
            ProgressSnapshot::from_state(&state, "unknown-run", chrono::Utc::now())
        });
        Ok(DayEnvelope {
            business_date: business_date.to_string(),
            generated_at: chrono::Utc::now(),
            checks: state.into_values().collect(),
            menu_items_summary,
            progress,
        })
    }

    /// Writes the day's terminal artifact atomically. The orchestrator
    /// calls this after a successful, non-metadata-only run; a partial or
    /// restarted-away run leaves the prior envelope (if any) untouched.
    async fn save_envelope(&self, envelope: &DayEnvelope) -> StateResult<()>;
}

/// Computes `ProgressSnapshot` totals from a state map.
pub fn progress_from_state(
    state: &StateMap,
    run_id: &str,
    updated_at: chrono::DateTime<chrono::Utc>,
) -> ProgressSnapshot {
    ProgressSnapshot::from_state(state, run_id, updated_at)
}
