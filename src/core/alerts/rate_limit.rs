// Token bucket limiting notifications per hour.
//
// Refill is continuous (capacity / 3600 tokens per second) so there is no
// wall-clock boundary at which a fresh burst becomes available.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: f64 = 3600.0;
// Absorbs float drift from many small refills summing to one whole token.
const TOKEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiter {
    capacity: u32,
    tokens: f64,
    last_refill: Option<DateTime<Utc>>,
}

impl RateLimiter {
    /// A full bucket holding `capacity` tokens.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            tokens: f64::from(capacity),
            last_refill: None,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens currently available, after refilling up to `now`.
    pub fn available(&mut self, now: DateTime<Utc>) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Follow a changed hourly cap. Raising the cap grants the extra headroom,
    /// lowering it discards tokens above the new cap.
    pub fn set_capacity(&mut self, capacity: u32) {
        if capacity == self.capacity {
            return;
        }
        let delta = f64::from(capacity) - f64::from(self.capacity);
        self.capacity = capacity;
        self.tokens = (self.tokens + delta.max(0.0)).min(f64::from(capacity));
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.capacity) / SECONDS_PER_HOUR
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let last = match self.last_refill {
            None => {
                self.last_refill = Some(now);
                return;
            }
            Some(last) => last,
        };
        // A clock that went backwards earns nothing and keeps the later mark.
        if now <= last {
            return;
        }
        let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_rate()).min(f64::from(self.capacity));
        self.last_refill = Some(now);
    }

    /// Take one token if available. A taken token is never refunded.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if self.tokens + TOKEN_EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }
}
