pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerConfig, BreakerSignal, CircuitBreaker, CircuitState};
pub use retry::{RetryError, RetryPolicy};
