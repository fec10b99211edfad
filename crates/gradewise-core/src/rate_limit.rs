use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window over dispatch timestamps.
pub struct RateLimiter {
    window: VecDeque<Instant>,
    max_per_minute: usize,
}

impl RateLimiter {
    pub fn new(max_per_minute: usize) -> Self {
        Self { window: VecDeque::new(), max_per_minute }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.window.front() {
            if now.saturating_duration_since(oldest) > WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records an attempt only when it is permitted.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.prune(now);
        if self.window.len() >= self.max_per_minute {
            return false;
        }
        self.window.push_back(now);
        true
    }

    pub fn remaining(&mut self) -> usize {
        self.prune(Instant::now());
        self.max_per_minute.saturating_sub(self.window.len())
    }

    /// Time until the oldest recorded attempt leaves the window; zero when a
    /// slot is free now.
    pub fn retry_after(&mut self) -> Duration {
        let now = Instant::now();
        self.prune(now);
        if self.window.len() < self.max_per_minute {
            return Duration::ZERO;
        }
        match self.window.front() {
            Some(&oldest) => (WINDOW + Duration::from_millis(1)).saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn exactly_max_requests_pass_within_window() {
        let mut rl = RateLimiter::new(10);
        for _ in 0..10 {
            assert!(rl.try_acquire());
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(!rl.try_acquire());
        assert_eq!(rl.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refusal_does_not_record() {
        let mut rl = RateLimiter::new(1);
        assert!(rl.try_acquire());
        for _ in 0..5 {
            assert!(!rl.try_acquire());
        }
        tokio::time::advance(WINDOW + Duration::from_millis(1)).await;
        assert!(rl.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_past_oldest_timestamp() {
        let mut rl = RateLimiter::new(3);
        assert!(rl.try_acquire());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rl.try_acquire());
        assert!(rl.try_acquire());
        assert!(!rl.try_acquire());

        let wait = rl.retry_after();
        assert_eq!(wait, Duration::from_millis(50_001));
        tokio::time::advance(wait).await;
        assert!(rl.try_acquire());
        // the two later stamps are still inside the window
        assert!(!rl.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_zero_with_free_slots() {
        let mut rl = RateLimiter::new(2);
        rl.try_acquire();
        assert_eq!(rl.retry_after(), Duration::ZERO);
        assert_eq!(rl.remaining(), 1);
    }
}
