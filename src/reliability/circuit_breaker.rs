use log::{error, info, warn};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        write!(f, "{}", s)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Rolling window over which error counts apply
    pub window: Duration,
    /// Windowed error count that trips the breaker
    pub error_threshold: u32,
    /// Windowed error count that raises an early warning without tripping
    pub warning_threshold: u32,
    /// How long the breaker stays Open before allowing a trial call
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            error_threshold: 20,
            warning_threshold: 10,
            cool_down: Duration::from_secs(60),
        }
    }
}

/// Outcome of recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerSignal {
    None,
    /// Warning threshold crossed; breaker still Closed
    Warning {
        errors_in_window: u32,
    },
    /// Breaker transitioned to Open
    Tripped,
}

struct BreakerInner {
    state: CircuitState,
    errors: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Fail-fast guard over a failing dependency.
///
/// Closed counts errors in a rolling window; reaching error_threshold trips
/// the breaker Open. After cool_down the breaker turns HalfOpen and admits
/// exactly one trial call: success closes it, failure re-opens it and
/// restarts the cool-down.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                errors: VecDeque::new(),
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Check whether a call may proceed. Transitions Open -> HalfOpen once
    /// the cool-down has elapsed; in HalfOpen only one trial is admitted.
    pub async fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cool_down)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!("circuit breaker half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.errors.clear();
                inner.opened_at = None;
                inner.trial_in_flight = false;
                info!("circuit breaker closed after successful trial");
            }
            CircuitState::Closed => {
                if let Some(cutoff) = Instant::now().checked_sub(self.config.window) {
                    while inner.errors.front().is_some_and(|t| *t < cutoff) {
                        inner.errors.pop_front();
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call, returning whether it warned or tripped
    pub async fn record_failure(&self) -> BreakerSignal {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                error!("circuit breaker re-opened after failed trial");
                BreakerSignal::Tripped
            }
            CircuitState::Closed => {
                let now = Instant::now();
                if let Some(cutoff) = now.checked_sub(self.config.window) {
                    while inner.errors.front().is_some_and(|t| *t < cutoff) {
                        inner.errors.pop_front();
                    }
                }
                inner.errors.push_back(now);
                let errors_in_window = inner.errors.len() as u32;

                if errors_in_window >= self.config.error_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    error!(
                        "circuit breaker opened: {} errors within {:?}",
                        errors_in_window, self.config.window
                    );
                    BreakerSignal::Tripped
                } else if errors_in_window >= self.config.warning_threshold {
                    warn!(
                        "circuit breaker warning: {} errors within {:?} (trip at {})",
                        errors_in_window, self.config.window, self.config.error_threshold
                    );
                    BreakerSignal::Warning { errors_in_window }
                } else {
                    BreakerSignal::None
                }
            }
            CircuitState::Open => BreakerSignal::None,
        }
    }

    /// Get current state (without side effects)
    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    /// Operator override: return the breaker to Closed and clear counters
    pub async fn force_reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = CircuitState::Closed;
        inner.errors.clear();
        inner.opened_at = None;
        inner.trial_in_flight = false;
        warn!("circuit breaker force-reset by operator");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(error_threshold: u32, warning_threshold: u32, cool_down: Duration) -> BreakerConfig {
        BreakerConfig {
            window: Duration::from_secs(300),
            error_threshold,
            warning_threshold,
            cool_down,
        }
    }

    #[tokio::test]
    async fn test_closed_allows_execution() {
        let cb = CircuitBreaker::new(config(3, 2, Duration::from_secs(1)));
        assert!(cb.can_execute().await);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_opens_at_error_threshold() {
        let cb = CircuitBreaker::new(config(3, 2, Duration::from_secs(60)));

        assert_eq!(cb.record_failure().await, BreakerSignal::None);
        assert_eq!(
            cb.record_failure().await,
            BreakerSignal::Warning { errors_in_window: 2 }
        );
        assert!(cb.can_execute().await); // still closed

        assert_eq!(cb.record_failure().await, BreakerSignal::Tripped);
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.can_execute().await);
    }

    #[tokio::test]
    async fn test_half_open_admits_exactly_one_trial() {
        let cb = CircuitBreaker::new(config(1, 1, Duration::from_millis(20)));

        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cb.can_execute().await); // the single trial
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        assert!(!cb.can_execute().await); // second caller is held back
    }

    #[tokio::test]
    async fn test_trial_success_closes() {
        let cb = CircuitBreaker::new(config(1, 1, Duration::from_millis(10)));

        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.can_execute().await);

        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        // Counters reset: one more failure only warns, does not trip twice
        assert!(cb.can_execute().await);
    }

    #[tokio::test]
    async fn test_trial_failure_reopens_and_restarts_cool_down() {
        let cb = CircuitBreaker::new(config(1, 1, Duration::from_millis(30)));

        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cb.can_execute().await);

        assert_eq!(cb.record_failure().await, BreakerSignal::Tripped);
        assert_eq!(cb.state().await, CircuitState::Open);
        // Cool-down restarted; immediately blocked again
        assert!(!cb.can_execute().await);
    }

    #[tokio::test]
    async fn test_force_reset() {
        let cb = CircuitBreaker::new(config(1, 1, Duration::from_secs(600)));
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        cb.force_reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.can_execute().await);
    }
}
