use std::time::Duration;

/// Exponential reconnect delay, doubling from `floor` and capped at `ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    floor: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            floor,
            ceiling: ceiling.max(floor),
        }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    ///
    /// `min(floor * 2^(attempt - 1), ceiling)`; attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.floor
            .checked_mul(1u32 << exp)
            .map_or(self.ceiling, |d| d.min(self.ceiling))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}
