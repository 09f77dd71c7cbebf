//! Reconnect policy: quadrupling delay, capped, with a terminal off switch.

use std::time::Duration;

use crate::config::PublisherConfig;

/// Controls how long the session waits before reconnecting after a close.
///
/// Each delay handed out is four times the previous one, capped at `max`.
/// An open transport calls [`reset`](Self::reset).  Once
/// [`disable`](Self::disable) has been called no delay is ever returned
/// again.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
    enabled: bool,
}

const GROWTH: u32 = 4;

impl Backoff {
    /// A zero `max` disables reconnection outright.
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = if max.is_zero() {
            Duration::ZERO
        } else {
            min.max(Duration::from_millis(1))
        };
        Self {
            min,
            max,
            current: min,
            enabled: !max.is_zero(),
        }
    }

    pub fn from_config(cfg: &PublisherConfig) -> Self {
        let (min, max) = cfg.backoff_bounds();
        Self::new(min, max)
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Back to the minimum delay.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// The delay before the next attempt, or `None` if no attempt should be
    /// made.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let delay = self.current;
        self.current = self.current.saturating_mul(GROWTH).min(self.max);
        Some(delay)
    }

    /// Irreversibly stop handing out delays.
    pub fn disable(&mut self) {
        self.enabled = false;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&PublisherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn default_sequence() {
        let mut b = Backoff::default();
        let delays: Vec<_> = (0..7).map(|_| b.next_delay().unwrap()).collect();
        assert_eq!(
            delays,
            [ms(500), ms(2000), ms(8000), ms(32_000), ms(60_000), ms(60_000), ms(60_000)]
        );
    }

    #[test]
    fn reset_returns_to_min() {
        let mut b = Backoff::new(ms(100), ms(10_000));
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Some(ms(100)));
    }

    #[test]
    fn zero_max_never_retries() {
        let mut b = Backoff::new(ms(500), Duration::ZERO);
        assert!(!b.is_enabled());
        assert_eq!(b.min(), Duration::ZERO);
        assert_eq!(b.next_delay(), None);
    }

    #[test]
    fn disable_is_terminal() {
        let mut b = Backoff::default();
        b.disable();
        assert_eq!(b.next_delay(), None);
        b.reset();
        assert_eq!(b.next_delay(), None);
        assert!(!b.is_enabled());
    }

    #[test]
    fn min_is_at_least_one_millisecond() {
        let b = Backoff::new(Duration::ZERO, ms(1000));
        assert_eq!(b.min(), ms(1));
    }
}
