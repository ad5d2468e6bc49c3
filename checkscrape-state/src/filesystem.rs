use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::CheckRecord;
use crate::ErrorEvent;
use crate::MenuSummaryRow;
use crate::ProgressSnapshot;
use crate::StateMap;
use crate::StateResult;
use crate::StateStore;
use crate::StateStoreError;

const REPORT_URL: &str = "https://reports.example.test/restaurants/admin/reports#sales-order-details";

/// Filesystem-backed [`StateStore`]. All writes go to `<path>.tmp` and are
/// renamed into place, so a crash between write and rename never leaves a
/// truncated file behind — the directory always contains either the
/// previous snapshot or the new one.
pub struct FileStateStore {
    dir: PathBuf,
    // Serializes writers; the orchestrator updates state from a single
    // thread but concurrent detail tabs can race append_error.
    write_lock: Mutex<()>,
}

impl FileStateStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    fn progress_path(&self) -> PathBuf {
        self.dir.join("progress.json")
    }

    fn menu_summary_path(&self) -> PathBuf {
        self.dir.join("menu_summary.json")
    }

    fn envelope_path(&self) -> PathBuf {
        self.dir.join("day_envelope.json")
    }

    fn error_log_path(&self) -> PathBuf {
        self.dir.join("errors.jsonl")
    }

    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> StateResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }
        let tmp_path = tmp_path_for(path);
        {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|source| io_err(&tmp_path, source))?;
            file.write_all(contents)
                .await
                .map_err(|source| io_err(&tmp_path, source))?;
            file.sync_all()
                .await
                .map_err(|source| io_err(&tmp_path, source))?;
        }
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|source| io_err(path, source))?;
        Ok(())
    }

    async fn read_optional(&self, path: &Path) -> StateResult<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(io_err(path, source)),
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn io_err(path: &Path, source: std::io::Error) -> StateStoreError {
    StateStoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> StateResult<StateMap> {
        let path = self.state_path();
        let Some(contents) = self.read_optional(&path).await? else {
            return Ok(StateMap::new());
        };
        let records: Vec<serde_json::Value> =
            serde_json::from_str(&contents).map_err(|source| StateStoreError::Deserialize {
                path: path.display().to_string(),
                source,
            })?;
        let mut state = StateMap::new();
        for mut raw in records {
            CheckRecord::migrate_legacy(&mut raw, REPORT_URL);
            let record: CheckRecord =
                serde_json::from_value(raw).map_err(|source| StateStoreError::Deserialize {
                    path: path.display().to_string(),
                    source,
                })?;
            state.insert(record.payment_id.clone(), record);
        }
        Ok(state)
    }

    async fn save(&self, state: &StateMap) -> StateResult<()> {
        // BTreeMap already iterates in payment_id order.
        let records: Vec<&CheckRecord> = state.values().collect();
        let contents =
            serde_json::to_vec_pretty(&records).map_err(StateStoreError::Serialize)?;
        self.write_atomic(&self.state_path(), &contents).await
    }

    async fn load_progress(&self) -> StateResult<Option<ProgressSnapshot>> {
        let path = self.progress_path();
        let Some(contents) = self.read_optional(&path).await? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_str(&contents).map_err(|source| {
            StateStoreError::Deserialize {
                path: path.display().to_string(),
                source,
            }
        })?;
        Ok(Some(snapshot))
    }

    async fn save_progress(&self, state: &StateMap, run_id: &str) -> StateResult<()> {
        let snapshot = crate::progress_from_state(state, run_id, chrono::Utc::now());
        let contents =
            serde_json::to_vec_pretty(&snapshot).map_err(StateStoreError::Serialize)?;
        self.write_atomic(&self.progress_path(), &contents).await
    }

    async fn append_error(&self, event: &ErrorEvent) -> StateResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.error_log_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent, source))?;
        }
        let mut line = serde_json::to_string(event).map_err(StateStoreError::Serialize)?;
        line.push('\n');
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| io_err(&path, source))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| io_err(&path, source))?;
        Ok(())
    }

    async fn load_menu_summary(&self) -> StateResult<Vec<MenuSummaryRow>> {
        let path = self.menu_summary_path();
        let Some(contents) = self.read_optional(&path).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&contents).map_err(|source| StateStoreError::Deserialize {
            path: path.display().to_string(),
            source,
        })
    }

    async fn save_menu_summary(&self, rows: &[MenuSummaryRow]) -> StateResult<()> {
        let contents = serde_json::to_vec_pretty(rows).map_err(StateStoreError::Serialize)?;
        self.write_atomic(&self.menu_summary_path(), &contents)
            .await
    }

    async fn save_envelope(&self, envelope: &crate::DayEnvelope) -> StateResult<()> {
        let contents = serde_json::to_vec_pretty(envelope).map_err(StateStoreError::Serialize)?;
        self.write_atomic(&self.envelope_path(), &contents).await
    }
}
