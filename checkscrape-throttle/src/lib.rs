//! Cross-worker rate limiter and throttle controller (§4.7).
//!
//! Concurrency in this crate family is cooperative single-threaded, but
//! operations may still be interleaved across tabs (detail work running
//! alongside the main crawl), so the serialized "next launch time" and the
//! throttle multiplier both live behind a lock rather than being plain
//! fields the orchestrator mutates directly.

use std::time::Duration;

use checkscrape_clock::Clock;
use checkscrape_clock::jitter_range;
use tokio::sync::Mutex;
use tracing::info;

const MULTIPLIER_MIN: f64 = 1.5;
const MULTIPLIER_MAX: f64 = 8.0;
const MULTIPLIER_GROWTH: f64 = 1.65;
const MULTIPLIER_RELAX: f64 = 0.1;
const MAX_COOLDOWN_SECS: f64 = 120.0;
const COOLDOWN_JITTER_MS: u64 = 1_500;

struct ThrottleState {
    multiplier: f64,
    throttle_events: u32,
    throttle_until: Duration,
    next_launch: Duration,
}

/// Serializes detail-navigation launch timing and widens a global cooldown
/// whenever a caller reports a throttle/auth-block signal (§4.7).
pub struct ThrottleController {
    base_interval: Duration,
    state: Mutex<ThrottleState>,
}

impl ThrottleController {
    #[must_use]
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            state: Mutex::new(ThrottleState {
                multiplier: 1.0,
                throttle_events: 0,
                throttle_until: Duration::ZERO,
                next_launch: Duration::ZERO,
            }),
        }
    }

    #[must_use]
    pub async fn multiplier(&self) -> f64 {
        self.state.lock().await.multiplier
    }

    /// Reserves the next launch slot and sleeps until it arrives. The next
    /// permitted start is the later of `now`, `previous_launch +
    /// jitter(detail_start_min_interval_ms * multiplier)`, and any active
    /// throttle cooldown.
    pub async fn wait_for_launch_slot(&self, clock: &dyn Clock) {
        let sleep_for = {
            let mut state = self.state.lock().await;
            let now = clock.now();
            let interval = Duration::from_secs_f64(
                self.base_interval.as_secs_f64() * state.multiplier,
            );
            let spaced = jitter_range(interval, 0.8, 1.3);
            let earliest = state.next_launch.max(now + spaced).max(state.throttle_until);
            let launch_at = earliest.max(now);
            state.next_launch = launch_at;
            launch_at.saturating_sub(now)
        };
        if sleep_for > Duration::ZERO {
            clock.sleep(sleep_for).await;
        }
    }

    /// Records a throttle/auth-block signal (`AUTH_BLOCKED`, HTTP 429/403):
    /// grows the multiplier and widens the cooldown window. Emits
    /// `detail_throttle_backoff` with the new multiplier and cooldown.
    pub async fn record_throttle_event(&self, clock: &dyn Clock) {
        let (multiplier, cooldown_secs) = {
            let mut state = self.state.lock().await;
            state.throttle_events = state.throttle_events.saturating_add(1);
            state.multiplier = (state.multiplier * MULTIPLIER_GROWTH).clamp(MULTIPLIER_MIN, MULTIPLIER_MAX);
            let base_cooldown = MAX_COOLDOWN_SECS.min(2f64.powi(state.throttle_events.min(7) as i32));
            let cooldown = Duration::from_secs_f64(base_cooldown)
                + jitter_range(Duration::from_millis(COOLDOWN_JITTER_MS), 0.0, 1.0);
            state.throttle_until = clock.now() + cooldown;
            (state.multiplier, cooldown.as_secs_f64())
        };
        info!(multiplier, cooldown_secs, "detail_throttle_backoff");
    }

    /// Relaxes the multiplier by 10% toward 1.0 on each success.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.multiplier -= MULTIPLIER_RELAX * (state.multiplier - 1.0);
    }
}
