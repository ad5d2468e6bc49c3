use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::DayEnvelope;
use crate::ErrorEvent;
use crate::MenuSummaryRow;
use crate::ProgressSnapshot;
use crate::StateMap;
use crate::StateResult;
use crate::StateStore;

/// In-memory [`StateStore`] used by orchestrator and pagination tests so
/// scenario tests never touch a filesystem.
#[derive(Default)]
pub struct InMemoryStateStore {
    state: RwLock<StateMap>,
    progress: RwLock<Option<ProgressSnapshot>>,
    menu_summary: RwLock<Vec<MenuSummaryRow>>,
    error_log: RwLock<Vec<ErrorEvent>>,
    envelope: RwLock<Option<DayEnvelope>>,
}

impl InMemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn error_log(&self) -> Vec<ErrorEvent> {
        self.error_log.read().await.clone()
    }

    pub async fn saved_envelope(&self) -> Option<DayEnvelope> {
        self.envelope.read().await.clone()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self) -> StateResult<StateMap> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &StateMap) -> StateResult<()> {
        *self.state.write().await = state.clone();
        Ok(())
    }

    async fn load_progress(&self) -> StateResult<Option<ProgressSnapshot>> {
        Ok(self.progress.read().await.clone())
    }

    async fn save_progress(&self, state: &StateMap, run_id: &str) -> StateResult<()> {
        let snapshot = crate::progress_from_state(state, run_id, chrono::Utc::now());
        *self.progress.write().await = Some(snapshot);
        Ok(())
    }

    async fn append_error(&self, event: &ErrorEvent) -> StateResult<()> {
        self.error_log.write().await.push(event.clone());
        Ok(())
    }

    async fn load_menu_summary(&self) -> StateResult<Vec<MenuSummaryRow>> {
        Ok(self.menu_summary.read().await.clone())
    }

    async fn save_menu_summary(&self, rows: &[MenuSummaryRow]) -> StateResult<()> {
        *self.menu_summary.write().await = rows.to_vec();
        Ok(())
    }

    async fn save_envelope(&self, envelope: &DayEnvelope) -> StateResult<()> {
        *self.envelope.write().await = Some(envelope.clone());
        Ok(())
    }
}
