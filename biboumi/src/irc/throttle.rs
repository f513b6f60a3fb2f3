//! Send throttling: a token bucket guarding outbound IRC lines
//! (spec.md §4.7 "Send throttling", §8 property P7).

use std::time::{Duration, Instant};

/// A token bucket with a configurable per-second refill rate.
pub struct TokenBucket {
    limit: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// `limit` is the bucket capacity, `refill_rate` tokens/second. The
    /// bucket starts full, matching the spec's default of 10/s.
    pub fn new(limit: u32, refill_rate: f64) -> Self {
        TokenBucket {
            limit: limit as f64,
            tokens: limit as f64,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.limit);
        self.last_refill = now;
    }

    /// Tries to consume one token. Returns `true` if a send may proceed
    /// immediately, `false` if it must be queued.
    pub fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// How long until at least one token is available.
    pub fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

/// Queues outbound IRC lines and releases them as the bucket's tokens allow.
pub struct ThrottledQueue {
    bucket: TokenBucket,
    pending: std::collections::VecDeque<String>,
}

impl ThrottledQueue {
    /// Builds a queue around a fresh bucket of the given shape.
    pub fn new(limit: u32, refill_rate: f64) -> Self {
        ThrottledQueue {
            bucket: TokenBucket::new(limit, refill_rate),
            pending: std::collections::VecDeque::new(),
        }
    }

    /// Enqueues a line to be sent once the bucket allows it.
    pub fn push(&mut self, line: String) {
        self.pending.push_back(line);
    }

    /// Drains as many queued lines as the bucket currently allows.
    pub fn drain_ready(&mut self) -> Vec<String> {
        let mut ready = Vec::new();
        while !self.pending.is_empty() && self.bucket.try_consume() {
            ready.push(self.pending.pop_front().unwrap());
        }
        ready
    }

    /// Whether anything is still queued.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Delay until the next line (if any) can be sent.
    pub fn next_wakeup(&mut self) -> Option<Duration> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.bucket.time_until_available())
        }
    }
}
