//! Per-connection inbound token bucket.
//!
//! Owned by the session loop, so no locking. Frames beyond the budget are
//! dropped; the connection stays open.

use tokio::time::{Duration, Instant};

const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug)]
pub struct InboundLimiter {
    rps: u32,
    capacity: u32,
    tokens: u32,
    last: Instant,
}

impl InboundLimiter {
    pub fn new(rps: u32, burst: u32) -> Self {
        let capacity = burst.max(1);
        Self {
            rps: rps.max(1),
            capacity,
            tokens: capacity,
            last: Instant::now(),
        }
    }

    pub fn allow(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    /// Credits whole tokens; the unspent fraction stays in `last`.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last).as_nanos();
        let rps = u128::from(self.rps);
        let add = elapsed * rps / NANOS_PER_SEC;
        if add == 0 {
            return;
        }
        let room = u128::from(self.capacity - self.tokens);
        if add >= room {
            self.tokens = self.capacity;
            self.last = now;
        } else {
            // add < room <= capacity, so neither cast truncates
            self.tokens += add as u32;
            self.last += Duration::from_nanos((add * NANOS_PER_SEC / rps) as u64);
        }
    }
}
