//! Per-dependency circuit breaker state machine. Lifetime is the process
//! lifetime: a fresh worker always starts CLOSED. Cross-process
//! coordination is deliberately not attempted here (see DESIGN.md) — the
//! durable store's row-level locking is the only cross-process guarantee
//! this engine makes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set once a HALF_OPEN probe has been let through, so a flood of
    /// concurrent callers doesn't all see themselves as "the" probe.
    probe_in_flight: bool,
}

/// One breaker per dependency. `allow_request`/`record_success`/
/// `record_failure` are the only mutation points; all are mutex-guarded so
/// the state transition is atomic per breaker.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    /// Gate consulted before every attempt. Transitions OPEN -> HALF_OPEN
    /// when the open duration has elapsed, letting exactly one probe
    /// through.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.open_duration {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.consecutive_failures += 1;
            }
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {
                // Already open; nothing to do.
            }
        }
    }
}

/// Lazily constructs and holds one breaker per dependency name.
pub struct CircuitBreakerRegistry {
    configs: HashMap<String, BreakerConfig>,
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(configs: HashMap<String, BreakerConfig>) -> Self {
        Self {
            configs,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, dependency: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                let config = self.configs.get(dependency).copied().unwrap_or_default();
                std::sync::Arc::new(CircuitBreaker::new(config))
            })
            .clone()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            open_duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn closed_allows_until_threshold() {
        let cb = CircuitBreaker::new(fast_config());
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn open_denies_until_duration_elapsed() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        assert!(!cb.allow_request());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_success_closes() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow_request());
        cb.record_success();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(fast_config());
        for _ in 0..3 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[test]
    fn registry_reuses_breaker_per_dependency() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get("DB_PRIMARY");
        let b = registry.get("DB_PRIMARY");
        a.record_failure();
        assert_eq!(b.state(), BreakerState::Closed); // below threshold
    }
}
