use crate::config::{
    CIRCUIT_BREAKER_RESET_SECS, CIRCUIT_BREAKER_THRESHOLD, RECONNECT_BACKOFF_BASE_MS,
    RECONNECT_BACKOFF_FACTOR, RECONNECT_BACKOFF_JITTER, RECONNECT_BACKOFF_MAX_MS,
};
use rand::Rng;
use std::time::{Duration, Instant};

// Exponential backoff with bounded jitter. One instance per connection
// attempt loop; reset on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    factor: u32,
    max: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, factor: u32, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            factor,
            max,
            jitter,
            attempt: 0,
        }
    }

    pub fn reconnect() -> Self {
        Self::new(
            Duration::from_millis(RECONNECT_BACKOFF_BASE_MS),
            RECONNECT_BACKOFF_FACTOR,
            Duration::from_millis(RECONNECT_BACKOFF_MAX_MS),
            RECONNECT_BACKOFF_JITTER,
        )
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    // Delay for the next attempt: base * factor^attempt, capped at max,
    // then +/- jitter percent
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base
            .saturating_mul(self.factor.saturating_pow(self.attempt));
        let capped = exp.min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        if self.jitter <= 0.0 {
            return capped;
        }

        let jitter = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let millis = capped.as_millis() as f64 * (1.0 + jitter);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

// Trips open after N consecutive failures, half-opens after the reset
// window. Success in any state closes it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    reset: Duration,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset: Duration) -> Self {
        Self {
            threshold,
            reset,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    // Returns true when this failure tripped the breaker open
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures == self.threshold {
            self.opened_at = Some(Instant::now());
            return true;
        }
        false
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_open(&self) -> bool {
        match self.opened_at {
            Some(at) => at.elapsed() < self.reset,
            None => false,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(
            CIRCUIT_BREAKER_THRESHOLD,
            Duration::from_secs(CIRCUIT_BREAKER_RESET_SECS),
        )
    }
}
