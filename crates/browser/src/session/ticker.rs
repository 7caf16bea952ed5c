//! Session tick
//!
//! Fast first tick, then a fixed period. Missed ticks are delayed, never
//! bunched. A tick that arrives later than `period + stall_timeout` after the
//! previous one means the loop was blocked and is reported as a stall.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub struct Ticker {
    interval: Interval,
    period: Duration,
    stall_timeout: Option<Duration>,
    last: Option<Instant>,
}

impl Ticker {
    pub fn new(first: Duration, period: Duration, stall_timeout: Option<Duration>) -> Self {
        let mut interval = interval_at(Instant::now() + first, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            period,
            stall_timeout,
            last: None,
        }
    }

    /// Wait for the next tick; `true` when it came too late
    pub async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        let now = Instant::now();

        let stalled = match (self.last, self.stall_timeout) {
            (Some(last), Some(limit)) => now.duration_since(last) > self.period + limit,
            _ => false,
        };
        self.last = Some(now);

        if stalled {
            tracing::warn!("session loop stalled");
        }
        stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_regular_ticks_do_not_stall() {
        let mut ticker = Ticker::new(
            Duration::from_millis(10),
            Duration::from_secs(1),
            Some(Duration::from_millis(500)),
        );
        for _ in 0..3 {
            assert!(!ticker.tick().await);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_tick_is_a_stall() {
        let mut ticker = Ticker::new(
            Duration::from_millis(10),
            Duration::from_secs(1),
            Some(Duration::from_millis(500)),
        );
        assert!(!ticker.tick().await);

        // Block the loop past the tolerance
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(ticker.tick().await);
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_never_stalls() {
        let mut ticker = Ticker::new(Duration::ZERO, Duration::from_secs(1), None);
        ticker.tick().await;
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!ticker.tick().await);
    }
}
