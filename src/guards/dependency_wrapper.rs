//! Wraps every outbound dependency call with circuit-breaker pre-checks,
//! a timeout, failure classification, and exponential backoff with jitter.
//! Write-path calls never retry (`is_write` forces `max_retries = 0`).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::circuit_breaker::CircuitBreakerRegistry;
use super::failure_taxonomy::{classify, CallOutcome, FailureClass};

/// The closed set of outbound dependency kinds this engine calls through
/// the wrapper. Concrete adapters for EXTERNAL_API live outside this
/// crate's scope (§1); the wrapper only needs the dependency's name to
/// look up its breaker/timeout/retry config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    DbPrimary,
    DbReplica,
    Cache,
    ExternalApi,
    ImportWorker,
}

impl Dependency {
    pub fn name(&self) -> &'static str {
        match self {
            Dependency::DbPrimary => "DB_PRIMARY",
            Dependency::DbReplica => "DB_REPLICA",
            Dependency::Cache => "CACHE",
            Dependency::ExternalApi => "EXTERNAL_API",
            Dependency::ImportWorker => "IMPORT_WORKER",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
    pub jitter_pct: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            cap_delay: Duration::from_secs(10),
            jitter_pct: 0.2,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct WrapperConfig {
    pub per_dependency: HashMap<&'static str, RetryConfig>,
}

/// What the wrapper raises when it gives up. Mirrors the HTTP mapping in
/// SPEC_FULL.md §4.4: CircuitOpen -> 503, Timeout -> 504,
/// Connection -> 502, other CB-failure -> 502. Non-CB failures pass the
/// callee's own error straight through via `CallFailed`.
#[derive(Debug)]
pub enum CallError<E> {
    CircuitOpen,
    Timeout,
    CallFailed(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::CircuitOpen => write!(f, "circuit open"),
            CallError::Timeout => write!(f, "dependency call timed out"),
            CallError::CallFailed(e) => write!(f, "{e}"),
        }
    }
}

/// A callee returns its outcome classification alongside its real error,
/// so the wrapper never has to guess what counts as a CB-failure.
pub trait Classifiable {
    fn outcome(&self) -> CallOutcome;
}

pub struct DependencyWrapper {
    registry: Arc<CircuitBreakerRegistry>,
    config: WrapperConfig,
}

impl DependencyWrapper {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, config: WrapperConfig) -> Self {
        Self { registry, config }
    }

    fn retry_config(&self, dependency: Dependency) -> RetryConfig {
        self.config
            .per_dependency
            .get(dependency.name())
            .copied()
            .unwrap_or_default()
    }

    /// Executes `call` under the full guard stack. `is_write` forces
    /// `max_retries` to zero regardless of configuration, because a
    /// retried write could double-apply.
    pub async fn call<T, E, F, Fut>(
        &self,
        dependency: Dependency,
        is_write: bool,
        mut call: F,
    ) -> Result<T, CallError<E>>
    where
        E: Classifiable + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let breaker = self.registry.get(dependency.name());
        let retry_config = self.retry_config(dependency);
        let max_retries = if is_write { 0 } else { retry_config.max_retries };

        let mut last_err: Option<CallError<E>> = None;

        for attempt in 0..=max_retries {
            if !breaker.allow_request() {
                return Err(CallError::CircuitOpen);
            }

            let attempt_result =
                tokio::time::timeout(retry_config.timeout, call()).await;

            match attempt_result {
                Err(_elapsed) => {
                    breaker.record_failure();
                    last_err = Some(CallError::Timeout);
                }
                Ok(Ok(value)) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Ok(Err(callee_err)) => {
                    let outcome = callee_err.outcome();
                    match classify(&outcome) {
                        FailureClass::CircuitBreakerFailure => {
                            breaker.record_failure();
                            last_err = Some(CallError::CallFailed(callee_err));
                        }
                        FailureClass::NonCircuitBreakerFailure => {
                            // Non-CB failures never retry and never touch
                            // the breaker; surface immediately.
                            return Err(CallError::CallFailed(callee_err));
                        }
                    }
                }
            }

            if attempt < max_retries {
                if !breaker.allow_request() {
                    return Err(CallError::CircuitOpen);
                }
                let delay = Self::backoff_delay(&retry_config, attempt);
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_err.unwrap_or(CallError::Timeout))
    }

    fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
        let base_ms = config.base_delay.as_millis() as u64;
        let cap_ms = config.cap_delay.as_millis() as u64;
        let exp = base_ms.saturating_mul(1u64 << attempt.min(20));
        let delay_ms = exp.min(cap_ms);
        let jitter_ms = if delay_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=((delay_ms as f64 * config.jitter_pct) as u64).max(1))
        };
        Duration::from_millis(delay_ms + jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct StubError(CallOutcome);
    impl fmt::Display for StubError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl Classifiable for StubError {
        fn outcome(&self) -> CallOutcome {
            self.0.clone()
        }
    }

    fn wrapper() -> DependencyWrapper {
        let registry = Arc::new(CircuitBreakerRegistry::default());
        let mut per_dependency = HashMap::new();
        per_dependency.insert(
            Dependency::ExternalApi.name(),
            RetryConfig {
                timeout: Duration::from_millis(50),
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                cap_delay: Duration::from_millis(5),
                jitter_pct: 0.1,
            },
        );
        DependencyWrapper::new(registry, WrapperConfig { per_dependency })
    }

    #[tokio::test]
    async fn success_returns_immediately() {
        let w = wrapper();
        let result: Result<i32, StubError> = w
            .call(Dependency::ExternalApi, false, || async { Ok(42) })
            .await;
        assert!(matches!(result, Ok(42)));
    }

    #[tokio::test]
    async fn non_cb_failure_never_retries() {
        let w = wrapper();
        let calls = AtomicU32::new(0);
        let result: Result<i32, StubError> = w
            .call(Dependency::ExternalApi, false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StubError(CallOutcome::RemoteStatus(404))) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_path_never_retries() {
        let w = wrapper();
        let calls = AtomicU32::new(0);
        let result: Result<i32, StubError> = w
            .call(Dependency::ExternalApi, true, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StubError(CallOutcome::Timeout)) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cb_failure_retries_up_to_budget() {
        let w = wrapper();
        let calls = AtomicU32::new(0);
        let result: Result<i32, StubError> = w
            .call(Dependency::ExternalApi, false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(StubError(CallOutcome::RemoteStatus(503))) }
            })
            .await;
        assert!(result.is_err());
        // max_retries = 2 => 3 total attempts
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
