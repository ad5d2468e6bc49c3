#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Layered run configuration and the externalized selector-family document.
//!
//! Precedence, lowest to highest: built-in [`RunConfig::defaults`], an
//! optional TOML file, then environment-variable overrides. The merge is
//! field-by-field via [`PartialRunConfig`] so a caller can also construct one
//! in-process (tests do this) without touching a file or the environment at
//! all.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("config value out of range: {0}")]
    OutOfRange(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("selector document missing required family: {0}")]
    MissingSelectorFamily(&'static str),
}

/// Fully resolved, validated run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub business_dates: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub allow_manual_fallback: bool,
    pub headless: bool,
    pub metadata_only: bool,
    pub profile_dir: PathBuf,
    pub artifact_dir: PathBuf,
    pub selector_document_path: PathBuf,

    pub challenge_timeout_sec: u64,
    pub auth_timeout_sec: u64,
    pub max_auth_attempts: u32,
    pub auth_block_restarts: u32,
    pub auth_block_cooldown_sec: u64,

    pub detail_start_min_interval_ms: u64,
    pub human_min_delay_ms: u64,
    pub human_max_delay_ms: u64,

    pub navigation_timeout_sec: u64,
    pub pagination_advance_timeout_sec: u64,
    pub max_pagination_pages: u32,
    pub wipe_profile_on_auth_block: bool,
}

impl RunConfig {
    /// Built-in defaults; every numeric knob mentioned in the design
    /// document has a sane out-of-the-box value so a minimal override file
    /// only needs to set credentials and paths.
    #[must_use]
    pub fn defaults() -> PartialRunConfig {
        PartialRunConfig {
            business_dates: None,
            username: None,
            password: None,
            allow_manual_fallback: Some(false),
            headless: Some(true),
            metadata_only: Some(false),
            profile_dir: None,
            artifact_dir: None,
            selector_document_path: None,
            challenge_timeout_sec: Some(120),
            auth_timeout_sec: Some(45),
            max_auth_attempts: Some(3),
            auth_block_restarts: Some(3),
            auth_block_cooldown_sec: Some(60),
            detail_start_min_interval_ms: Some(1_200),
            human_min_delay_ms: Some(250),
            human_max_delay_ms: Some(900),
            navigation_timeout_sec: Some(45),
            pagination_advance_timeout_sec: Some(30),
            max_pagination_pages: Some(500),
            wipe_profile_on_auth_block: Some(false),
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_sec)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_sec)
    }

    pub fn pagination_advance_timeout(&self) -> Duration {
        Duration::from_secs(self.pagination_advance_timeout_sec)
    }
}

/// Every field optional, so partials from different sources can be merged
/// with later sources overriding earlier ones.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PartialRunConfig {
    pub business_dates: Option<Vec<String>>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub allow_manual_fallback: Option<bool>,
    pub headless: Option<bool>,
    pub metadata_only: Option<bool>,
    pub profile_dir: Option<PathBuf>,
    pub artifact_dir: Option<PathBuf>,
    pub selector_document_path: Option<PathBuf>,
    pub challenge_timeout_sec: Option<u64>,
    pub auth_timeout_sec: Option<u64>,
    pub max_auth_attempts: Option<u32>,
    pub auth_block_restarts: Option<u32>,
    pub auth_block_cooldown_sec: Option<u64>,
    pub detail_start_min_interval_ms: Option<u64>,
    pub human_min_delay_ms: Option<u64>,
    pub human_max_delay_ms: Option<u64>,
    pub navigation_timeout_sec: Option<u64>,
    pub pagination_advance_timeout_sec: Option<u64>,
    pub max_pagination_pages: Option<u32>,
    pub wipe_profile_on_auth_block: Option<bool>,
}

impl PartialRunConfig {
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads overrides from a caller-supplied environment mapping (so tests
    /// don't need to touch the real process environment). Variable names
    /// follow `CHECKSCRAPE_<FIELD_NAME_UPPERCASE>`.
    #[must_use]
    pub fn from_env_map(env: &HashMap<String, String>) -> Self {
        let mut partial = Self::default();
        macro_rules! pull {
            ($field:ident, $parse:expr) => {
                if let Some(raw) = env.get(concat!("CHECKSCRAPE_", stringify!($field))) {
                    partial.$field = $parse(raw);
                }
            };
        }
        pull!(username, |raw: &String| Some(raw.clone()));
        pull!(password, |raw: &String| Some(raw.clone()));
        pull!(profile_dir, |raw: &String| Some(PathBuf::from(raw)));
        pull!(artifact_dir, |raw: &String| Some(PathBuf::from(raw)));
        pull!(selector_document_path, |raw: &String| Some(PathBuf::from(
            raw
        )));
        pull!(headless, |raw: &String| raw.parse::<bool>().ok());
        pull!(metadata_only, |raw: &String| raw.parse::<bool>().ok());
        pull!(allow_manual_fallback, |raw: &String| raw
            .parse::<bool>()
            .ok());
        pull!(challenge_timeout_sec, |raw: &String| raw.parse().ok());
        pull!(auth_timeout_sec, |raw: &String| raw.parse().ok());
        pull!(max_auth_attempts, |raw: &String| raw.parse().ok());
        pull!(auth_block_restarts, |raw: &String| raw.parse().ok());
        pull!(auth_block_cooldown_sec, |raw: &String| raw.parse().ok());
        pull!(detail_start_min_interval_ms, |raw: &String| raw
            .parse()
            .ok());
        pull!(human_min_delay_ms, |raw: &String| raw.parse().ok());
        pull!(human_max_delay_ms, |raw: &String| raw.parse().ok());
        pull!(navigation_timeout_sec, |raw: &String| raw.parse().ok());
        pull!(pagination_advance_timeout_sec, |raw: &String| raw
            .parse()
            .ok());
        pull!(max_pagination_pages, |raw: &String| raw.parse().ok());
        pull!(wipe_profile_on_auth_block, |raw: &String| raw
            .parse::<bool>()
            .ok());
        if let Some(raw) = env.get("CHECKSCRAPE_BUSINESS_DATES") {
            partial.business_dates =
                Some(raw.split(',').map(str::trim).map(str::to_string).collect());
        }
        partial
    }

    #[must_use]
    pub fn merge(self, override_with: Self) -> Self {
        Self {
            business_dates: override_with.business_dates.or(self.business_dates),
            username: override_with.username.or(self.username),
            password: override_with.password.or(self.password),
            allow_manual_fallback: override_with
                .allow_manual_fallback
                .or(self.allow_manual_fallback),
            headless: override_with.headless.or(self.headless),
            metadata_only: override_with.metadata_only.or(self.metadata_only),
            profile_dir: override_with.profile_dir.or(self.profile_dir),
            artifact_dir: override_with.artifact_dir.or(self.artifact_dir),
            selector_document_path: override_with
                .selector_document_path
                .or(self.selector_document_path),
            challenge_timeout_sec: override_with
                .challenge_timeout_sec
                .or(self.challenge_timeout_sec),
            auth_timeout_sec: override_with.auth_timeout_sec.or(self.auth_timeout_sec),
            max_auth_attempts: override_with.max_auth_attempts.or(self.max_auth_attempts),
            auth_block_restarts: override_with
                .auth_block_restarts
                .or(self.auth_block_restarts),
            auth_block_cooldown_sec: override_with
                .auth_block_cooldown_sec
                .or(self.auth_block_cooldown_sec),
            detail_start_min_interval_ms: override_with
                .detail_start_min_interval_ms
                .or(self.detail_start_min_interval_ms),
            human_min_delay_ms: override_with
                .human_min_delay_ms
                .or(self.human_min_delay_ms),
            human_max_delay_ms: override_with
                .human_max_delay_ms
                .or(self.human_max_delay_ms),
            navigation_timeout_sec: override_with
                .navigation_timeout_sec
                .or(self.navigation_timeout_sec),
            pagination_advance_timeout_sec: override_with
                .pagination_advance_timeout_sec
                .or(self.pagination_advance_timeout_sec),
            max_pagination_pages: override_with
                .max_pagination_pages
                .or(self.max_pagination_pages),
            wipe_profile_on_auth_block: override_with
                .wipe_profile_on_auth_block
                .or(self.wipe_profile_on_auth_block),
        }
    }

    /// Validates required fields and numeric ranges, producing the
    /// immutable [`RunConfig`] the rest of the crate family consumes.
    pub fn finish(self) -> ConfigResult<RunConfig> {
        let profile_dir = self
            .profile_dir
            .ok_or(ConfigError::MissingField("profile_dir"))?;
        let artifact_dir = self
            .artifact_dir
            .ok_or(ConfigError::MissingField("artifact_dir"))?;
        let selector_document_path = self
            .selector_document_path
            .ok_or(ConfigError::MissingField("selector_document_path"))?;
        let business_dates = self
            .business_dates
            .filter(|dates| !dates.is_empty())
            .ok_or(ConfigError::MissingField("business_dates"))?;

        let human_min_delay_ms = self.human_min_delay_ms.unwrap_or(250);
        let human_max_delay_ms = self.human_max_delay_ms.unwrap_or(900);
        if human_max_delay_ms < human_min_delay_ms {
            return Err(ConfigError::OutOfRange(
                "human_max_delay_ms must be >= human_min_delay_ms".into(),
            ));
        }

        let max_auth_attempts = self.max_auth_attempts.unwrap_or(3);
        if max_auth_attempts == 0 {
            return Err(ConfigError::OutOfRange(
                "max_auth_attempts must be >= 1".into(),
            ));
        }

        Ok(RunConfig {
            business_dates,
            username: self.username,
            password: self.password,
            allow_manual_fallback: self.allow_manual_fallback.unwrap_or(false),
            headless: self.headless.unwrap_or(true),
            metadata_only: self.metadata_only.unwrap_or(false),
            profile_dir,
            artifact_dir,
            selector_document_path,
            challenge_timeout_sec: self.challenge_timeout_sec.unwrap_or(120),
            auth_timeout_sec: self.auth_timeout_sec.unwrap_or(45),
            max_auth_attempts,
            auth_block_restarts: self.auth_block_restarts.unwrap_or(3),
            auth_block_cooldown_sec: self.auth_block_cooldown_sec.unwrap_or(60),
            detail_start_min_interval_ms: self.detail_start_min_interval_ms.unwrap_or(1_200),
            human_min_delay_ms,
            human_max_delay_ms,
            navigation_timeout_sec: self.navigation_timeout_sec.unwrap_or(45),
            pagination_advance_timeout_sec: self.pagination_advance_timeout_sec.unwrap_or(30),
            max_pagination_pages: self.max_pagination_pages.unwrap_or(500),
            wipe_profile_on_auth_block: self.wipe_profile_on_auth_block.unwrap_or(false),
        })
    }
}

/// A priority-ordered list of CSS selectors; the first matching (and, where
/// relevant, visible) node wins.
pub type SelectorFamily = Vec<String>;

/// The externalized DOM contract from the design document's selector table,
/// loaded from a config document rather than hardcoded so operators can
/// patch it without a code change.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SelectorDocument {
    pub payments: PaymentsSelectors,
    pub order_details: OrderDetailsSelectors,
    pub auth: AuthSelectors,
    pub challenge: ChallengeMarkers,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentsSelectors {
    #[serde(default)]
    pub table_rows: SelectorFamily,
    #[serde(default)]
    pub table_headers: SelectorFamily,
    #[serde(default)]
    pub date_range_dropdown: SelectorFamily,
    #[serde(default)]
    pub custom_date_option: SelectorFamily,
    #[serde(default)]
    pub date_start_input: SelectorFamily,
    #[serde(default)]
    pub date_end_input: SelectorFamily,
    #[serde(default)]
    pub apply_button: SelectorFamily,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OrderDetailsSelectors {
    #[serde(default)]
    pub tab_link: SelectorFamily,
    #[serde(default)]
    pub order_blocks: SelectorFamily,
    #[serde(default)]
    pub order_next_button: SelectorFamily,
    #[serde(default)]
    pub pagination_summary: SelectorFamily,
    #[serde(default)]
    pub order_detail_meta_id: SelectorFamily,
    #[serde(default)]
    pub loading_spinner: SelectorFamily,
    #[serde(default)]
    pub top_items_table: SelectorFamily,
    #[serde(default)]
    pub per_page_select: SelectorFamily,
    #[serde(default)]
    pub per_page_100_option: SelectorFamily,
    #[serde(default)]
    pub next_button: SelectorFamily,
    #[serde(default)]
    pub menu_summary_rows: SelectorFamily,
    #[serde(default)]
    pub menu_summary_pagination_summary: SelectorFamily,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthSelectors {
    #[serde(default)]
    pub logged_out_markers: SelectorFamily,
    #[serde(default)]
    pub username_inputs: SelectorFamily,
    #[serde(default)]
    pub password_inputs: SelectorFamily,
    #[serde(default)]
    pub submit_buttons: SelectorFamily,
    #[serde(default)]
    pub not_now_buttons: SelectorFamily,
    #[serde(default)]
    pub authenticated_markers: SelectorFamily,
}

/// CDN "human verification" interstitial markers; kept alongside the rest of
/// the selector document so newly observed markers can be added without a
/// code change.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChallengeMarkers {
    #[serde(default)]
    pub title_substrings: Vec<String>,
    #[serde(default)]
    pub marker_selectors: SelectorFamily,
    #[serde(default)]
    pub marker_texts: Vec<String>,
}

impl SelectorDocument {
    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        document.validate()?;
        Ok(document)
    }

    /// The vendor-observed defaults (title/marker set named in the design
    /// document) used when no document is supplied, e.g. in tests.
    #[must_use]
    pub fn vendor_defaults() -> Self {
        Self {
            payments: PaymentsSelectors {
                table_rows: vec!["table.payments tbody tr".into()],
                table_headers: vec!["table.payments thead th".into()],
                date_range_dropdown: vec!["select.date-range-dropdown".into()],
                custom_date_option: vec!["option[value='custom']".into()],
                date_start_input: vec!["#startDate".into(), "input[name='start_date']".into()],
                date_end_input: vec!["#endDate".into(), "input[name='end_date']".into()],
                apply_button: vec!["button.apply-date-range".into()],
            },
            order_details: OrderDetailsSelectors {
                tab_link: vec!["a[href='#sales-order-details']".into()],
                order_blocks: vec![".order-border".into()],
                order_next_button: vec![".pagination:last-of-type li.next a".into()],
                pagination_summary: vec![".pagination-summary:last-of-type".into()],
                order_detail_meta_id: vec![".order-detail-meta-id".into()],
                loading_spinner: vec![".report-loading-spinner".into()],
                top_items_table: vec!["table.menu-item-summary".into()],
                per_page_select: vec!["select.per-page".into()],
                per_page_100_option: vec!["option[value='100']".into()],
                next_button: vec![".pagination:last-of-type li.next a".into()],
                menu_summary_rows: vec!["table.menu-item-summary tbody tr".into()],
                menu_summary_pagination_summary: vec![".pagination-summary:last-of-type".into()],
            },
            auth: AuthSelectors {
                logged_out_markers: vec!["a[href*='login']".into()],
                username_inputs: vec!["input[name='username']".into()],
                password_inputs: vec!["input[name='password']".into()],
                submit_buttons: vec!["button[type='submit']".into()],
                not_now_buttons: vec![
                    "button:contains('Not now')".into(),
                    "button:contains('Remind me later')".into(),
                    "button:contains('Skip')".into(),
                ],
                authenticated_markers: vec![".dashboard-root".into()],
            },
            challenge: ChallengeMarkers {
                title_substrings: vec!["just a moment".into()],
                marker_selectors: vec![
                    "input[name='cf-turnstile-response']".into(),
                    "script[src*='challenge-platform']".into(),
                ],
                marker_texts: vec![
                    "Verifying you are human".into(),
                    "needs to review the security".into(),
                ],
            },
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        macro_rules! require {
            ($family:expr, $name:literal) => {
                if $family.is_empty() {
                    return Err(ConfigError::MissingSelectorFamily($name));
                }
            };
        }
        require!(
            self.payments.date_range_dropdown,
            "payments.date_range_dropdown"
        );
        require!(
            self.payments.custom_date_option,
            "payments.custom_date_option"
        );
        require!(self.payments.date_start_input, "payments.date_start_input");
        require!(self.payments.date_end_input, "payments.date_end_input");
        require!(self.payments.apply_button, "payments.apply_button");
        require!(self.order_details.tab_link, "order_details.tab_link");
        require!(self.order_details.order_blocks, "order_details.order_blocks");
        require!(
            self.order_details.order_next_button,
            "order_details.order_next_button"
        );
        require!(
            self.order_details.pagination_summary,
            "order_details.pagination_summary"
        );
        require!(self.auth.username_inputs, "auth.username_inputs");
        require!(self.auth.password_inputs, "auth.password_inputs");
        require!(self.auth.submit_buttons, "auth.submit_buttons");
        require!(
            self.auth.authenticated_markers,
            "auth.authenticated_markers"
        );
        require!(self.challenge.title_substrings, "challenge.title_substrings");
        Ok(())
    }
}
