use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state machine: Closed counts failures, Open rejects for a cooldown
/// window, HalfOpen admits probes until enough consecutive successes close it
/// again. Any failure while half-open reopens immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes.
    pub success_threshold: u32,
    /// How long the circuit stays open before admitting probes.
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Counters are atomics; the state byte only moves under strictly sequenced
/// record/acquire calls, and the opened-at instant sits behind a mutex.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => BreakerState::Open,
            STATE_HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    /// Whether a call may proceed. While open, flips to half-open once the
    /// cooldown has elapsed and admits that call as a probe.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = {
                    let opened_at = self.opened_at.lock().unwrap_or_else(|e| e.into_inner());
                    opened_at.map(|at| at.elapsed())
                };
                if elapsed.is_some_and(|e| e >= self.config.timeout) {
                    self.consecutive_successes.store(0, Ordering::Release);
                    self.state.store(STATE_HALF_OPEN, Ordering::Release);
                    tracing::info!("Circuit breaker half-open, admitting probes");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            BreakerState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            BreakerState::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.consecutive_failures.store(0, Ordering::Release);
                    self.state.store(STATE_CLOSED, Ordering::Release);
                    tracing::info!(successes, "Circuit breaker closed");
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            BreakerState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.open();
                    tracing::warn!(failures, "Circuit breaker opened");
                }
            }
            BreakerState::HalfOpen => {
                self.open();
                tracing::warn!("Circuit breaker reopened by half-open failure");
            }
            BreakerState::Open => {}
        }
    }

    fn open(&self) {
        let mut opened_at = self.opened_at.lock().unwrap_or_else(|e| e.into_inner());
        *opened_at = Some(Instant::now());
        self.consecutive_successes.store(0, Ordering::Release);
        self.state.store(STATE_OPEN, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            timeout,
        })
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(Duration::from_secs(30));
        assert_eq!(cb.state(), BreakerState::Closed);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(!cb.try_acquire());
    }

    #[test]
    fn success_resets_failure_streak_while_closed() {
        let cb = breaker(Duration::from_secs(30));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_successes() {
        let cb = breaker(Duration::from_millis(0));
        for _ in 0..3 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), BreakerState::Open);

        // Zero timeout: the next acquire flips to half-open
        assert!(cb.try_acquire());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(Duration::from_millis(0));
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(cb.try_acquire());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
