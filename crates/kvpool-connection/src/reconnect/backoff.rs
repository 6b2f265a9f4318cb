//! Capped exponential backoff for reconnect attempts

use std::time::Duration;

use rand::Rng;

/// Fraction of a delay that jitter may add or remove
const JITTER_SPREAD: f64 = 0.25;

/// Delay schedule between reconnect attempts
///
/// Attempt `n` waits `initial * multiplier^n`, never more than the ceiling.
/// With jitter enabled each delay is spread by ±25% so that many clients
/// dropped by the same failover do not reconnect in lockstep.
///
/// # Example
///
/// ```
/// use kvpool_connection::reconnect::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::new(50, 2_000);
///
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(50));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(20), Duration::from_millis(2_000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffStrategy {
    initial: Duration,
    ceiling: Duration,
    multiplier: f64,
    jitter: bool,
}

impl BackoffStrategy {
    /// Schedule starting at `initial_ms` and doubling up to `max_ms`
    ///
    /// The first delay is at least 1ms; a ceiling below it is raised to it.
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        let initial = Duration::from_millis(initial_ms.max(1));
        Self {
            initial,
            ceiling: Duration::from_millis(max_ms).max(initial),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Growth per attempt; values below 1.0 are treated as 1.0
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the zero-based reconnect `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let ceiling_ms = self.ceiling.as_millis() as f64;
        let growth = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let base_ms = (self.initial.as_millis() as f64 * growth).min(ceiling_ms);

        let delay_ms = if self.jitter {
            let factor = rand::thread_rng().gen_range(1.0 - JITTER_SPREAD..=1.0 + JITTER_SPREAD);
            base_ms * factor
        } else {
            base_ms
        };

        Duration::from_millis(delay_ms.round() as u64)
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial
    }

    pub fn max_delay(&self) -> Duration {
        self.ceiling
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn has_jitter(&self) -> bool {
        self.jitter
    }
}

impl Default for BackoffStrategy {
    /// 50ms doubling to a 2s ceiling, no jitter
    fn default() -> Self {
        Self::new(50, 2_000)
    }
}
