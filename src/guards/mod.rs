pub mod circuit_breaker;
pub mod dependency_wrapper;
pub mod failure_taxonomy;
pub mod kill_switch;
pub mod pilot_guard;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerRegistry};
pub use dependency_wrapper::{CallError, DependencyWrapper, Dependency, WrapperConfig};
pub use failure_taxonomy::{classify, FailureClass};
pub use kill_switch::{KillSwitchRegistry, SwitchStatus};
pub use pilot_guard::{PilotGuard, PilotRateLimitExceeded};
