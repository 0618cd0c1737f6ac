//! Non-blocking token bucket for LLM backpressure (§4.10). Unlike the
//! sliding-window limiter the market-data adapters use, a cycle must never
//! block waiting for a slot — when tokens run out the article is simply left
//! for the next cycle, so `try_acquire` returns instead of sleeping.

use std::sync::Mutex;
use tokio::time::Instant;

pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `rate_per_minute` tokens are added per minute, up to `rate_per_minute` banked.
    pub fn new(rate_per_minute: u32) -> Self {
        let capacity = rate_per_minute as f64;
        Self {
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
