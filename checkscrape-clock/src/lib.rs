//! Monotonic time source and bounded random delay generation.
//!
//! Every other crate in this workspace asks for delays through this crate
//! rather than calling `tokio::time::sleep` or `rand` directly, so that a
//! test can swap in a [`FrozenClock`] and observe exactly which delays were
//! requested without actually waiting for them.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Abstracts "what time is it" and "sleep for this long" so orchestration
/// logic can be driven deterministically in tests.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time`, monotonic from process start.
#[derive(Debug, Clone, Default)]
pub struct SystemClock {
    epoch: std::sync::OnceLock<tokio::time::Instant>,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn epoch(&self) -> tokio::time::Instant {
        *self.epoch.get_or_init(tokio::time::Instant::now)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch().elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock a test can advance by hand. [`FrozenClock::sleep`] records the
/// requested duration and advances its own notion of "now" immediately
/// rather than actually waiting, so scenario tests run instantly.
#[derive(Debug, Clone, Default)]
pub struct FrozenClock {
    inner: Arc<Mutex<FrozenClockState>>,
}

#[derive(Debug, Default)]
struct FrozenClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl FrozenClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manually advance the clock without recording a sleep.
    pub fn advance(&self, by: Duration) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.elapsed += by;
    }

    /// The durations passed to `sleep` so far, in call order.
    #[must_use]
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.sleeps.clone()
    }
}

#[async_trait]
impl Clock for FrozenClock {
    fn now(&self) -> Duration {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.elapsed += duration;
        guard.sleeps.push(duration);
    }
}

/// Returns a duration within `[base * (1 - frac), base * (1 + frac)]`.
///
/// `frac` is clamped to `[0.0, 1.0]`. Used for human-paced action delays,
/// where the spread is symmetric around the base.
pub fn jitter(base: Duration, frac: f64) -> Duration {
    jitter_with_rng(&mut rand::rng(), base, frac)
}

fn jitter_with_rng<R: Rng + ?Sized>(rng: &mut R, base: Duration, frac: f64) -> Duration {
    let frac = frac.clamp(0.0, 1.0);
    jitter_range_with_rng(rng, base, 1.0 - frac, 1.0 + frac)
}

/// Returns a duration within `[base * low_frac, base * high_frac]`.
///
/// Unlike [`jitter`], the two bounds need not be symmetric around `base` —
/// used for the inter-navigation spacing jitter, which the design spreads
/// asymmetrically within `[0.8, 1.3]` of the configured base.
pub fn jitter_range(base: Duration, low_frac: f64, high_frac: f64) -> Duration {
    jitter_range_with_rng(&mut rand::rng(), base, low_frac, high_frac)
}

fn jitter_range_with_rng<R: Rng + ?Sized>(
    rng: &mut R,
    base: Duration,
    low_frac: f64,
    high_frac: f64,
) -> Duration {
    let base_ms = base.as_millis() as f64;
    let low = base_ms * low_frac;
    let high = base_ms * high_frac;
    let sampled = if high > low {
        rng.random_range(low..=high)
    } else {
        base_ms
    };
    Duration::from_millis(sampled.max(0.0) as u64)
}

/// A human-paced pause sampled uniformly from `[min_ms, max_ms]`.
pub fn human_pause(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

/// Exponential backoff iterator: `min(initial * base^n, max)`, one entry
/// per retry attempt starting at `n = 0`.
pub fn backoff_iter(initial: Duration, max: Duration, base: u32) -> impl Iterator<Item = Duration> {
    let initial_ms = initial.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    (0u32..).map(move |index| {
        let factor = u64::from(base).saturating_pow(index);
        let wait_ms = initial_ms.saturating_mul(factor);
        Duration::from_millis(wait_ms.min(max_ms))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1_000);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        for _ in 0..50 {
            let d = jitter_with_rng(&mut rng, base, 0.3);
            assert!(d.as_millis() >= 700, "{d:?} below lower bound");
            assert!(d.as_millis() <= 1_300, "{d:?} above upper bound");
        }
    }

    #[test]
    fn jitter_range_respects_asymmetric_bounds() {
        let base = Duration::from_millis(1_000);
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        for _ in 0..50 {
            let d = jitter_range_with_rng(&mut rng, base, 0.8, 1.3);
            assert!(d.as_millis() >= 800, "{d:?} below lower bound");
            assert!(d.as_millis() <= 1_300, "{d:?} above upper bound");
        }
    }

    #[test]
    fn jitter_zero_frac_returns_base() {
        let base = Duration::from_millis(500);
        let mut rng = rand::rngs::mock::StepRng::new(42, 7);
        assert_eq!(jitter_with_rng(&mut rng, base, 0.0), base);
    }

    #[test]
    fn backoff_never_overflows_and_caps_at_max() {
        let mut it = backoff_iter(Duration::from_millis(250), Duration::from_millis(32_000), 2);
        for _ in 0..200 {
            let d = it.next().expect("iterator is infinite");
            assert!(d <= Duration::from_millis(32_000));
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let mut it = backoff_iter(Duration::from_millis(250), Duration::from_millis(1_000), 2);
        assert_eq!(it.next(), Some(Duration::from_millis(250)));
        assert_eq!(it.next(), Some(Duration::from_millis(500)));
        assert_eq!(it.next(), Some(Duration::from_millis(1_000)));
        assert_eq!(it.next(), Some(Duration::from_millis(1_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn system_clock_advances_with_sleep() {
        let clock = SystemClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_secs(5)).await;
        let after = clock.now();
        assert!(after - before >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn frozen_clock_records_sleeps_without_waiting() {
        let clock = FrozenClock::new();
        clock.sleep(Duration::from_secs(30)).await;
        clock.sleep(Duration::from_secs(5)).await;
        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_secs(30), Duration::from_secs(5)]
        );
        assert_eq!(clock.now(), Duration::from_secs(35));
    }
}
