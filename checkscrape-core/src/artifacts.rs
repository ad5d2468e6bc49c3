use std::path::Path;
use std::path::PathBuf;

use chrono::Utc;
use tracing::warn;

/// A screenshot + HTML + structural-summary capture, grounded at a single
/// notable failure point (auth blocked, pagination stall/mismatch, a
/// suspicious zero-rows report) and written into one timestamped directory
/// per run (§4.10, §6.3).
pub struct ArtifactWriter {
    run_dir: PathBuf,
}

impl ArtifactWriter {
    #[must_use]
    pub fn new(artifact_dir: &Path, run_id: &str) -> Self {
        Self {
            run_dir: artifact_dir.join(run_id),
        }
    }

    /// Writes `<label>-<timestamp>.png` / `.html` / `.json` under the run
    /// directory. Failures here are logged and swallowed — losing a debug
    /// artifact must never abort an otherwise-successful run.
    pub async fn capture(&self, label: &str, screenshot: &[u8], html: &str, visible_markers: &[String]) {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let stem = self.run_dir.join(format!("{label}-{stamp}"));
        if let Err(err) = tokio::fs::create_dir_all(&self.run_dir).await {
            warn!(error = %err, "failed to create artifact directory");
            return;
        }
        if let Err(err) = tokio::fs::write(stem.with_extension("png"), screenshot).await {
            warn!(error = %err, "failed to write artifact screenshot");
        }
        if let Err(err) = tokio::fs::write(stem.with_extension("html"), html).await {
            warn!(error = %err, "failed to write artifact html");
        }
        let summary = serde_json::json!({ "visible_markers": visible_markers });
        let rendered = serde_json::to_vec_pretty(&summary).unwrap_or_default();
        if let Err(err) = tokio::fs::write(stem.with_extension("json"), rendered).await {
            warn!(error = %err, "failed to write artifact summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn capture_writes_all_three_files_under_the_run_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = ArtifactWriter::new(dir.path(), "run-123");
        writer
            .capture("auth_blocked", b"not-really-a-png", "<html></html>", &["input[name='cf-turnstile-response']".to_string()])
            .await;

        let run_dir = dir.path().join("run-123");
        let mut reader = tokio::fs::read_dir(&run_dir).await.expect("read_dir");
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().await.expect("entry") {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        assert_eq!(names.len(), 3, "expected screenshot, html, and summary files");
    }
}
