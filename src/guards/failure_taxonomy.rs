//! Pure classification of a dependency failure. This is the sole authority
//! on whether a failure counts against a circuit breaker and is eligible
//! for retry — no other layer may classify inline.

use std::fmt;

/// An outcome a dependency call can fail with, described independently of
/// any particular HTTP client so the taxonomy stays pure.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Timeout,
    ConnectionRefused,
    NetworkUnreachable,
    RemoteStatus(u16),
    Validation(String),
    Argument(String),
    Other(String),
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Timeout => write!(f, "timeout"),
            CallOutcome::ConnectionRefused => write!(f, "connection refused"),
            CallOutcome::NetworkUnreachable => write!(f, "network unreachable"),
            CallOutcome::RemoteStatus(code) => write!(f, "remote status {code}"),
            CallOutcome::Validation(msg) => write!(f, "validation error: {msg}"),
            CallOutcome::Argument(msg) => write!(f, "argument error: {msg}"),
            CallOutcome::Other(msg) => write!(f, "{msg}"),
        }
    }
}

/// The two-way split the wrapper acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Counts against the breaker; retryable under backoff.
    CircuitBreakerFailure,
    /// Never counted, never retried — surfaced to the caller as-is.
    NonCircuitBreakerFailure,
}

/// Classifies a call outcome. Timeouts, connection failures, unreachable
/// network, and any remote status >= 500 are CB-failures. Everything else
/// (4xx including 429, validation/argument errors) is not.
pub fn classify(outcome: &CallOutcome) -> FailureClass {
    match outcome {
        CallOutcome::Timeout
        | CallOutcome::ConnectionRefused
        | CallOutcome::NetworkUnreachable => FailureClass::CircuitBreakerFailure,
        CallOutcome::RemoteStatus(code) if *code >= 500 => FailureClass::CircuitBreakerFailure,
        CallOutcome::RemoteStatus(_) => FailureClass::NonCircuitBreakerFailure,
        CallOutcome::Validation(_) | CallOutcome::Argument(_) => {
            FailureClass::NonCircuitBreakerFailure
        }
        CallOutcome::Other(_) => FailureClass::NonCircuitBreakerFailure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_cb_failure() {
        assert_eq!(
            classify(&CallOutcome::Timeout),
            FailureClass::CircuitBreakerFailure
        );
    }

    #[test]
    fn server_error_is_cb_failure() {
        assert_eq!(
            classify(&CallOutcome::RemoteStatus(503)),
            FailureClass::CircuitBreakerFailure
        );
    }

    #[test]
    fn client_error_is_not_cb_failure() {
        assert_eq!(
            classify(&CallOutcome::RemoteStatus(429)),
            FailureClass::NonCircuitBreakerFailure
        );
        assert_eq!(
            classify(&CallOutcome::RemoteStatus(404)),
            FailureClass::NonCircuitBreakerFailure
        );
    }

    #[test]
    fn validation_error_is_not_cb_failure() {
        assert_eq!(
            classify(&CallOutcome::Validation("bad".into())),
            FailureClass::NonCircuitBreakerFailure
        );
    }
}
