//! Randomized delay between rows.

use std::time::Duration;

use rand::Rng;

/// Uniform random pause in `[min, max]`. A zero range disables pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    /// Bounds given in either order.
    pub fn new(a: Duration, b: Duration) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Draw the next delay.
    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        let delay = self.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "pacing");
        tokio::time::sleep(delay).await;
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::from_millis(2_000, 5_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let pacing = Pacing::from_millis(50, 10);
        for _ in 0..200 {
            let d = pacing.next_delay();
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_zero_range_disables() {
        assert!(Pacing::none().is_disabled());
        assert!(!Pacing::default().is_disabled());
        tokio_test::block_on(Pacing::none().pause());
    }

    #[tokio::test]
    async fn test_pause_sleeps() {
        let start = tokio::time::Instant::now();
        Pacing::from_millis(30, 30).pause().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
