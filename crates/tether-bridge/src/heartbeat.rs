//! Heartbeat liveness tracking for the initiating side.
//!
//! The initiating peer originates `ping` envelopes on a fixed interval and
//! treats a missing `pong` past the liveness timeout as the sole signal that
//! the connection is dead — a half-open TCP connection gives no other one.
//! The accepting peer is passive: it answers pings and originates nothing.

use std::time::{Duration, Instant};

/// Tracks ping cadence and pong recency for one connection instance.
#[derive(Debug)]
pub struct HeartbeatTracker {
    last_pong_at: Instant,
    last_ping_sent: Option<Instant>,
    interval: Duration,
    timeout: Duration,
}

impl HeartbeatTracker {
    /// Create a tracker; `now` seeds pong recency (connect counts as alive).
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration, now: Instant) -> Self {
        Self {
            last_pong_at: now,
            last_ping_sent: None,
            interval,
            timeout,
        }
    }

    /// Reset for a fresh connection instance.
    pub fn reset(&mut self, now: Instant) {
        self.last_pong_at = now;
        self.last_ping_sent = None;
    }

    /// Whether a `ping` is due.
    #[must_use]
    pub fn should_ping(&self, now: Instant) -> bool {
        match self.last_ping_sent {
            None => true,
            Some(sent) => now.duration_since(sent) >= self.interval,
        }
    }

    /// Record that a `ping` was sent.
    pub fn mark_ping_sent(&mut self, now: Instant) {
        self.last_ping_sent = Some(now);
    }

    /// Record an inbound `pong`.
    pub fn mark_pong(&mut self, now: Instant) {
        self.last_pong_at = now;
    }

    /// Whether the liveness timeout has elapsed since the last `pong`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_pong_at) > self.timeout
    }

    /// Time of the last `pong` (or connect).
    #[must_use]
    pub fn last_pong_at(&self) -> Instant {
        self.last_pong_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(10);
    const TIMEOUT: Duration = Duration::from_secs(20);

    fn tracker(now: Instant) -> HeartbeatTracker {
        HeartbeatTracker::new(INTERVAL, TIMEOUT, now)
    }

    #[test]
    fn first_ping_is_due_immediately() {
        let now = Instant::now();
        assert!(tracker(now).should_ping(now));
    }

    #[test]
    fn ping_not_due_before_interval() {
        let now = Instant::now();
        let mut hb = tracker(now);
        hb.mark_ping_sent(now);
        assert!(!hb.should_ping(now + Duration::from_secs(9)));
        assert!(hb.should_ping(now + INTERVAL));
    }

    #[test]
    fn fresh_connection_is_not_expired() {
        let now = Instant::now();
        assert!(!tracker(now).is_expired(now + Duration::from_secs(19)));
    }

    #[test]
    fn no_disconnect_before_last_pong_plus_timeout() {
        let now = Instant::now();
        let mut hb = tracker(now);
        hb.mark_pong(now + Duration::from_secs(15));
        // lastPongAt moved forward, so the window slides with it.
        assert!(!hb.is_expired(now + Duration::from_secs(34)));
        assert!(hb.is_expired(now + Duration::from_secs(36)));
    }

    #[test]
    fn expired_exactly_past_the_timeout() {
        let now = Instant::now();
        let hb = tracker(now);
        assert!(!hb.is_expired(now + TIMEOUT));
        assert!(hb.is_expired(now + TIMEOUT + Duration::from_millis(1)));
    }

    #[test]
    fn reset_clears_ping_state_and_reseeds_pong() {
        let now = Instant::now();
        let mut hb = tracker(now);
        hb.mark_ping_sent(now);
        let later = now + Duration::from_secs(60);
        hb.reset(later);
        assert!(hb.should_ping(later));
        assert!(!hb.is_expired(later + Duration::from_secs(19)));
        assert_eq!(hb.last_pong_at(), later);
    }
}
