use std::time::Duration;

use checkscrape_auth::AuthError;
use checkscrape_auth::AuthGateConfig;
use checkscrape_auth::AuthState;
use checkscrape_auth::Credentials;
use checkscrape_browser::BrowserSession;
use checkscrape_browser::Page;
use checkscrape_clock::Clock;
use checkscrape_clock::jitter;
use checkscrape_config::RunConfig;
use checkscrape_config::SelectorDocument;
use checkscrape_pagination::PaginationEvent;
use checkscrape_report::ReportTab;
use checkscrape_state::CheckRecord;
use checkscrape_state::ErrorEvent;
use checkscrape_state::StateStore;
use checkscrape_throttle::ThrottleController;
use chrono::NaiveDate;
use chrono::Utc;
use tracing::info;
use tracing::warn;

use crate::artifacts::ArtifactWriter;
use crate::error::CoreError;
use crate::error::CoreResult;
use crate::summary::RunSummary;

/// Canonical Order Details entry point (§6.1). Mirrors the constant the
/// state store uses to synthesize `parsed_url` for legacy records.
const REPORTS_URL: &str = "https://reports.example.test/restaurants/admin/reports#sales-order-details";

/// Ties together auth, report driving, pagination, and the throttle
/// controller into the top-level crawl described in §4.8. Split into
/// [`Orchestrator::run_against_page`] (pure orchestration logic against an
/// already-open [`Page`], fully exercisable with the in-memory test
/// doubles) and [`Orchestrator::run`] (owns the real browser session and
/// the `AUTH_BLOCKED` restart loop).
pub struct Orchestrator {
    config: RunConfig,
    selectors: SelectorDocument,
    throttle: ThrottleController,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: RunConfig, selectors: SelectorDocument) -> Self {
        let throttle = ThrottleController::new(Duration::from_millis(config.detail_start_min_interval_ms));
        Self {
            config,
            selectors,
            throttle,
        }
    }

    fn business_date_range(&self) -> CoreResult<(NaiveDate, NaiveDate, String)> {
        let first = self
            .config
            .business_dates
            .first()
            .ok_or_else(|| CoreError::Fatal("business_dates is empty".to_string()))?;
        let last = self.config.business_dates.last().unwrap_or(first);
        let start = NaiveDate::parse_from_str(first, "%Y-%m-%d")
            .map_err(|err| CoreError::Fatal(format!("invalid business_date {first}: {err}")))?;
        let end = NaiveDate::parse_from_str(last, "%Y-%m-%d")
            .map_err(|err| CoreError::Fatal(format!("invalid business_date {last}: {err}")))?;
        Ok((start, end, first.clone()))
    }

    async fn fail_with_artifact(
        &self,
        page: &dyn Page,
        artifacts: &ArtifactWriter,
        state: &dyn StateStore,
        label: &str,
        event: &str,
        detail: String,
    ) -> CoreResult<()> {
        let screenshot = page.screenshot().await.unwrap_or_default();
        let html = page.html().await.unwrap_or_default();
        artifacts.capture(label, &screenshot, &html, &[]).await;
        state
            .append_error(&ErrorEvent::new(event).with_fields(serde_json::json!({"detail": detail})))
            .await?;
        Ok(())
    }

    /// Runs the full crawl against an already-authenticated-or-not page.
    /// Returns [`CoreError::AuthBlocked`] when the challenge never clears
    /// or credentials are exhausted, so [`Orchestrator::run`] can drive the
    /// bounded restart loop around it.
    pub async fn run_against_page(
        &self,
        page: &dyn Page,
        state: &dyn StateStore,
        clock: &dyn Clock,
        artifacts: &ArtifactWriter,
        run_id: &str,
    ) -> CoreResult<RunSummary> {
        info!(run_id, "run_start");
        page.navigate(REPORTS_URL).await?;

        self.throttle.wait_for_launch_slot(clock).await;
        let credentials = match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };
        let auth_config = AuthGateConfig {
            selectors: &self.selectors.auth,
            challenge: &self.selectors.challenge,
            credentials,
            allow_manual_fallback: self.config.allow_manual_fallback,
            challenge_timeout: self.config.challenge_timeout(),
            auth_timeout: Duration::from_secs(self.config.auth_timeout_sec),
            max_attempts: self.config.max_auth_attempts,
        };
        let mut blocked_artifact = None;
        match checkscrape_auth::run(page, clock, &auth_config, |artifact| blocked_artifact = Some(artifact)).await {
            Ok(AuthState::Authenticated) => {
                self.throttle.record_success().await;
                info!(run_id, "auth_attempt_success");
            }
            Ok(_) => {}
            Err(AuthError::Blocked { reason }) => {
                self.throttle.record_throttle_event(clock).await;
                if let Some(artifact) = blocked_artifact {
                    artifacts
                        .capture("auth_blocked", &artifact.screenshot, &artifact.html, &artifact.visible_markers)
                        .await;
                }
                state
                    .append_error(&ErrorEvent::new("auth_attempt_error").with_fields(serde_json::json!({"reason": reason})))
                    .await?;
                return Err(CoreError::AuthBlocked { reason });
            }
            Err(err) => return Err(err.into()),
        }

        let (start, end, business_date) = self.business_date_range()?;

        if let Err(err) = checkscrape_report::switch_tab(page, &self.selectors.order_details, ReportTab::OrderDetails, false).await {
            self.fail_with_artifact(page, artifacts, state, "tab_switch_failed", "order_details_tab_switch_error", err.to_string())
                .await?;
            return Err(err.into());
        }

        if let Err(err) = checkscrape_report::set_date_range(page, &self.selectors.payments, start, end).await {
            self.fail_with_artifact(page, artifacts, state, "date_range_failed", "date_range_error", err.to_string())
                .await?;
            return Err(err.into());
        }

        let mut page_events = Vec::new();
        let order_outcome = checkscrape_pagination::crawl_order_details(
            page,
            clock,
            &self.selectors.order_details,
            self.config.pagination_advance_timeout(),
            self.config.max_pagination_pages,
            |event| page_events.push(event),
        )
        .await;
        let order_outcome = match order_outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail_with_artifact(page, artifacts, state, "order_details_crawl_failed", "order_details_crawl_error", err.to_string())
                    .await?;
                return Err(err.into());
            }
        };
        self.drain_pagination_events(page, artifacts, state, page_events).await?;

        if order_outcome.collected == 0 {
            warn!(run_id, "order_details_zero_rows");
            self.fail_with_artifact(page, artifacts, state, "zero_rows", "order_details_zero_rows", "no order blocks extracted".to_string())
                .await?;
        }

        let mut current_state = state.load().await?;
        let extracted_at = Utc::now();
        for (payment_id, (metadata, payload, parsed_url)) in order_outcome.blocks {
            let detail = checkscrape_parser::parse(&payload);
            let record = current_state
                .entry(payment_id.clone())
                .or_insert_with(|| CheckRecord::new_minimal(&payment_id, &parsed_url));
            record.metadata = metadata;
            record.last_error = (!detail.validation_errors.is_empty())
                .then(|| detail.validation_errors.join("; "));
            record.complete = detail.complete;
            record.data = detail;
            record.attempts += 1;
            record.extracted_at = Some(extracted_at);
            record.parsed_url = parsed_url;
        }
        state.save(&current_state).await?;
        state.save_progress(&current_state, run_id).await?;

        if let Err(err) = checkscrape_report::set_per_page_100(page, &self.selectors.order_details).await {
            warn!(run_id, error = %err, "menu_summary_per_page_failed");
            state
                .append_error(&ErrorEvent::new("menu_summary_per_page_error").with_fields(serde_json::json!({"detail": err.to_string()})))
                .await?;
        }

        let mut menu_events = Vec::new();
        let menu_outcome = checkscrape_pagination::crawl_menu_summary(
            page,
            clock,
            &self.selectors.order_details,
            self.config.pagination_advance_timeout(),
            self.config.max_pagination_pages,
            |event| menu_events.push(event),
        )
        .await;
        let menu_outcome = match menu_outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail_with_artifact(page, artifacts, state, "menu_summary_crawl_failed", "menu_summary_crawl_error", err.to_string())
                    .await?;
                return Err(err.into());
            }
        };
        self.drain_pagination_events(page, artifacts, state, menu_events).await?;
        state.save_menu_summary(&menu_outcome.rows).await?;

        let mut envelope_written = false;
        if !self.config.metadata_only {
            let envelope = state.build_envelope(&business_date).await?;
            state.save_envelope(&envelope).await?;
            envelope_written = true;
        }

        let summary = RunSummary {
            run_id: run_id.to_string(),
            order_details_pages_fetched: order_outcome.pages_fetched,
            checks_collected: order_outcome.collected,
            menu_summary_rows: menu_outcome.rows.len(),
            restarts: 0,
            envelope_written,
        };
        info!(
            run_id,
            checks_collected = summary.checks_collected,
            menu_summary_rows = summary.menu_summary_rows,
            envelope_written,
            "run_complete"
        );
        Ok(summary)
    }

    async fn drain_pagination_events(
        &self,
        page: &dyn Page,
        artifacts: &ArtifactWriter,
        state: &dyn StateStore,
        events: Vec<PaginationEvent>,
    ) -> CoreResult<()> {
        for event in events {
            state
                .append_error(&ErrorEvent::new(event.event.clone()).with_fields(event.fields.clone()))
                .await?;
            if event.event.ends_with("_stalled") || event.event.ends_with("_mismatch") {
                let screenshot = page.screenshot().await.unwrap_or_default();
                let html = page.html().await.unwrap_or_default();
                artifacts.capture(&event.event, &screenshot, &html, &[]).await;
            }
        }
        Ok(())
    }

    /// Owns the real browser session: launches it, drives
    /// [`Orchestrator::run_against_page`], and on `AUTH_BLOCKED` logs out
    /// by closing and relaunching the session (optionally wiping the
    /// profile directory first), sleeping a jittered cooldown, and
    /// retrying up to `auth_block_restarts` times (§4.8).
    pub async fn run(&self, state: &dyn StateStore, clock: &dyn Clock) -> CoreResult<RunSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let artifacts = ArtifactWriter::new(&self.config.artifact_dir, &run_id);
        let mut restarts = 0u32;

        loop {
            let session = BrowserSession::launch(&self.config.profile_dir, self.config.headless).await?;
            let page = session.new_page(REPORTS_URL).await?;
            let outcome = self.run_against_page(&page, state, clock, &artifacts, &run_id).await;
            if let Err(err) = session.close().await {
                warn!(run_id, error = %err, "browser_close_failed");
            }

            match outcome {
                Ok(mut summary) => {
                    summary.restarts = restarts;
                    return Ok(summary);
                }
                Err(CoreError::AuthBlocked { reason }) => {
                    restarts += 1;
                    warn!(run_id, attempt = restarts, reason, "run_restart");
                    state
                        .append_error(&ErrorEvent::new("run_restart").with_fields(serde_json::json!({
                            "reason": "auth_blocked",
                            "attempt": restarts,
                        })))
                        .await?;
                    if restarts > self.config.auth_block_restarts {
                        return Err(CoreError::AuthBlocked { reason });
                    }
                    if self.config.wipe_profile_on_auth_block {
                        if let Err(err) = tokio::fs::remove_dir_all(&self.config.profile_dir).await {
                            warn!(run_id, error = %err, "profile_wipe_failed");
                        }
                    }
                    let cooldown = jitter(Duration::from_secs(self.config.auth_block_cooldown_sec), 0.2);
                    info!(run_id, cooldown_secs = cooldown.as_secs_f64(), "auth_block_cooldown");
                    clock.sleep(cooldown).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkscrape_browser::FakeDomState;
    use checkscrape_browser::FakePage;
    use checkscrape_clock::FrozenClock;
    use checkscrape_config::PartialRunConfig;
    use checkscrape_config::SelectorDocument;
    use checkscrape_state::InMemoryStateStore;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn base_config() -> RunConfig {
        RunConfig::defaults()
            .merge(PartialRunConfig {
                business_dates: Some(vec!["2026-07-27".to_string()]),
                profile_dir: Some(PathBuf::from("/tmp/checkscrape-test-profile")),
                artifact_dir: Some(PathBuf::from("/tmp/checkscrape-test-artifacts")),
                selector_document_path: Some(PathBuf::from("/tmp/checkscrape-test-selectors.toml")),
                ..Default::default()
            })
            .finish()
            .expect("valid config")
    }

    fn order_block_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "payment_id": id,
            "metadata": {},
            "payload": {
                "pairs": {}, "tables": [], "summary": {}, "summary_details": {},
                "body_text": "", "metadata": {}
            },
            "parsed_url": "https://reports.example.test/a"
        })
    }

    fn happy_path_dom_state(selectors: &SelectorDocument) -> FakeDomState {
        let order_details = &selectors.order_details;
        let payments = &selectors.payments;

        let mut state = FakeDomState {
            present_selectors: vec![
                selectors.auth.authenticated_markers[0].clone(),
                order_details.tab_link[0].clone(),
                payments.date_range_dropdown[0].clone(),
                payments.custom_date_option[0].clone(),
                payments.date_start_input[0].clone(),
                payments.date_end_input[0].clone(),
                payments.apply_button[0].clone(),
                order_details.per_page_100_option[0].clone(),
            ],
            ..Default::default()
        };

        let block_script = checkscrape_pagination::order_blocks_script(
            &order_details.order_blocks[0],
            &order_details.order_detail_meta_id[0],
        );
        state.evaluate_results.insert(
            block_script,
            serde_json::Value::Array(vec![order_block_json("p001"), order_block_json("p002")]),
        );
        let summary_script =
            checkscrape_pagination::pagination_summary_script(&order_details.pagination_summary[0]);
        state.evaluate_results.insert(
            summary_script,
            serde_json::Value::String("Showing 1 through 2 of 2".to_string()),
        );
        let row_script = checkscrape_pagination::menu_summary_rows_script(&order_details.menu_summary_rows[0]);
        state.evaluate_results.insert(
            row_script,
            serde_json::json!([{"fields": {"item": "Burger", "qty": "5"}}]),
        );
        state
    }

    #[tokio::test]
    async fn happy_path_collects_checks_merges_state_and_writes_envelope() {
        let selectors = SelectorDocument::vendor_defaults();
        let config = base_config();
        let orchestrator = Orchestrator::new(config, selectors.clone());
        let page = FakePage::new(happy_path_dom_state(&selectors));
        let clock = FrozenClock::new();
        let store = InMemoryStateStore::new();
        let artifacts_dir = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactWriter::new(artifacts_dir.path(), "run-test-1");

        let summary = orchestrator
            .run_against_page(&page, &store, &clock, &artifacts, "run-test-1")
            .await
            .expect("run should succeed");

        assert_eq!(summary.checks_collected, 2);
        assert_eq!(summary.menu_summary_rows, 1);
        assert!(summary.envelope_written);

        let state = store.load().await.expect("load state");
        assert_eq!(state.len(), 2);
        assert!(state.contains_key("p001"));
        assert!(state.contains_key("p002"));

        let envelope = store.saved_envelope().await.expect("envelope saved");
        assert_eq!(envelope.checks.len(), 2);
        assert_eq!(envelope.business_date, "2026-07-27");
    }

    #[tokio::test]
    async fn metadata_only_run_skips_envelope_but_still_collects_checks() {
        let selectors = SelectorDocument::vendor_defaults();
        let mut config = base_config();
        config.metadata_only = true;
        let orchestrator = Orchestrator::new(config, selectors.clone());
        let page = FakePage::new(happy_path_dom_state(&selectors));
        let clock = FrozenClock::new();
        let store = InMemoryStateStore::new();
        let artifacts_dir = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactWriter::new(artifacts_dir.path(), "run-test-2");

        let summary = orchestrator
            .run_against_page(&page, &store, &clock, &artifacts, "run-test-2")
            .await
            .expect("run should succeed");

        assert_eq!(summary.checks_collected, 2);
        assert!(!summary.envelope_written);
        assert!(store.saved_envelope().await.is_none());
    }

    #[tokio::test]
    async fn auth_blocked_short_circuits_before_any_crawl() {
        let selectors = SelectorDocument::vendor_defaults();
        let config = base_config();
        let orchestrator = Orchestrator::new(config, selectors);
        let page = FakePage::new(FakeDomState::default());
        let clock = FrozenClock::new();
        let store = InMemoryStateStore::new();
        let artifacts_dir = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactWriter::new(artifacts_dir.path(), "run-test-3");

        let err = orchestrator
            .run_against_page(&page, &store, &clock, &artifacts, "run-test-3")
            .await
            .expect_err("no credentials and no manual fallback should fail fast");
        assert!(matches!(err, CoreError::Auth(AuthError::ManualFallbackDisallowed)));

        let state = store.load().await.expect("load state");
        assert!(state.is_empty());
        assert!(store.saved_envelope().await.is_none());
    }
}
