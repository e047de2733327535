//! Retry delay computation.
//!
//! Three schedules share one seedable RNG:
//! - a fixed staircase used while the process is inside its startup
//!   grace window,
//! - an exponential schedule with uniform jitter used after the window
//!   and for replica cooldowns,
//! - short in-replica request delays between attempts on one endpoint.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::options::RefreshConfig;
use crate::options::ReplicaConfig;
use crate::options::StartupConfig;

const EXP_SHIFT_CAP: u32 = 16;

pub(crate) struct BackoffSchedule {
    startup: StartupConfig,
    refresh: RefreshConfig,
    replica: ReplicaConfig,
    rng: Mutex<StdRng>,
}

impl BackoffSchedule {
    pub(crate) fn new(
        startup: StartupConfig,
        refresh: RefreshConfig,
        replica: ReplicaConfig,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            startup,
            refresh,
            replica,
            rng: Mutex::new(rng),
        }
    }

    /// Delay before the next startup attempt, or `None` once `elapsed`
    /// leaves the grace window and the exponential schedule takes over.
    pub(crate) fn startup_delay(&self, elapsed: Duration) -> Option<Duration> {
        let window = Duration::from_secs(self.startup.grace_window_secs);
        if elapsed >= window {
            return None;
        }
        let delay = match elapsed.as_secs() {
            0..=9 => Duration::from_secs(1),
            10..=29 => Duration::from_secs(2),
            30..=59 => Duration::from_secs(5),
            _ => Duration::from_secs(10),
        };
        Some(delay)
    }

    /// Post-window delay for the given 1-based attempt:
    /// `clamp(min * 2^(attempt-1), min, max)` scaled by uniform jitter
    /// in `[jitter_min, 1.0]`.
    pub(crate) fn refresh_delay(&self, attempt: u32) -> Duration {
        let min = Duration::from_secs(self.refresh.min_backoff_secs);
        let max = Duration::from_secs(self.refresh.max_backoff_secs);
        self.jittered_exponential(min, max, attempt)
    }

    /// Cooldown applied to a replica after its n-th consecutive failure.
    pub(crate) fn replica_cooldown(&self, consecutive_failures: u32) -> Duration {
        let min = Duration::from_secs(self.replica.cooldown_min_secs);
        let max = Duration::from_secs(self.replica.cooldown_max_secs);
        self.jittered_exponential(min, max, consecutive_failures.max(1))
    }

    /// Delay between attempts against the same replica.
    pub(crate) fn request_delay(&self, attempt: u32) -> Duration {
        let min = Duration::from_millis(self.replica.base_delay_ms);
        let max = Duration::from_millis(self.replica.max_delay_ms);
        self.jittered_exponential(min, max, attempt.max(1))
    }

    /// Uniform delay in `[0, max]` applied to push-notification intake.
    pub(crate) fn push_delay(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        let millis = max.as_millis().min(u128::from(u64::MAX)) as u64;
        let mut rng = self.rng.lock().expect("rng poisoned");
        Duration::from_millis(rng.gen_range(0..=millis))
    }

    fn jittered_exponential(&self, min: Duration, max: Duration, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(EXP_SHIFT_CAP);
        let factor = 1u128 << shift;
        let scaled = min.as_millis().saturating_mul(factor);
        let clamped = scaled
            .max(min.as_millis())
            .min(max.as_millis())
            .min(u128::from(u64::MAX)) as u64;
        let jitter = {
            let mut rng = self.rng.lock().expect("rng poisoned");
            rng.gen_range(self.refresh.jitter_min..=1.0)
        };
        Duration::from_millis((clamped as f64 * jitter).round() as u64)
    }
}
