use crate::core::events::{ExecutionReport, NewOrder, OrderId};
use crate::exchanges::{ExchangeClient, ExchangeError};
use crate::monitoring::{AlertLevel, AlertManager, MetricsCollector};
use crate::reliability::{
    BreakerConfig, BreakerSignal, CircuitBreaker, CircuitState, RetryError, RetryPolicy,
};
use log::{debug, error};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors surfaced by the order executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Breaker Open: the call was never sent to the exchange
    #[error("execution path circuit breaker is open")]
    CircuitOpen,

    /// Non-retryable exchange error, surfaced on the first occurrence
    #[error("exchange rejected the call: {0}")]
    Rejected(#[source] ExchangeError),

    /// Transient errors survived every retry attempt
    #[error("exchange call failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: ExchangeError,
    },
}

impl From<RetryError> for ExecutionError {
    fn from(e: RetryError) -> Self {
        match e {
            RetryError::Permanent(inner) => ExecutionError::Rejected(inner),
            RetryError::Exhausted { attempts, last } => {
                ExecutionError::Exhausted { attempts, last }
            }
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-attempt timeout on each exchange call
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    /// Consecutive-failure count that raises a warning alert
    pub failure_alert_threshold: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            failure_alert_threshold: 5,
        }
    }
}

/// Aggregate execution statistics since start
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStats {
    pub orders_placed: u64,
    pub orders_cancelled: u64,
    pub status_queries: u64,
    pub failures: u64,
    pub circuit_rejections: u64,
    pub latency_p50_ms: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub latency_p99_ms: Option<f64>,
}

/// The only component that talks to the exchange for placement, cancellation
/// and status queries. Every call runs under a per-attempt timeout, the retry
/// policy, and the path-level circuit breaker; when the breaker is Open calls
/// fail fast without contacting the exchange.
pub struct ReliableOrderExecutor {
    client: Arc<dyn ExchangeClient + Send + Sync>,
    config: ExecutorConfig,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsCollector>,
    alerts: Arc<AlertManager>,
    consecutive_failures: AtomicU32,
}

impl ReliableOrderExecutor {
    pub fn new(
        client: Arc<dyn ExchangeClient + Send + Sync>,
        config: ExecutorConfig,
        metrics: Arc<MetricsCollector>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
        Self {
            client,
            config,
            breaker,
            metrics,
            alerts,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Worst-case latency of one guarded call: the caller's timeout floor
    pub fn latency_bound(&self) -> Duration {
        let attempts = self.config.retry.max_retries + 1;
        self.config.request_timeout * attempts + self.config.retry.max_total_delay()
    }

    pub async fn breaker_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Operator override for the execution-path breaker
    pub async fn reset_breaker(&self) {
        self.breaker.force_reset().await;
    }

    async fn guarded<T, F, Fut>(
        &self,
        what: &'static str,
        histogram: &str,
        mut operation: F,
    ) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        if !self.breaker.can_execute().await {
            self.metrics
                .increment_counter("executor.circuit_rejections", 1)
                .await;
            debug!("{} rejected: circuit breaker open", what);
            return Err(ExecutionError::CircuitOpen);
        }

        let timeout = self.config.request_timeout;
        let started = Instant::now();
        let result = self
            .config
            .retry
            .run(what, || {
                let call = operation();
                async move {
                    match tokio::time::timeout(timeout, call).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ExchangeError::Timeout(timeout)),
                    }
                }
            })
            .await;
        self.metrics
            .record_histogram(histogram, started.elapsed().as_secs_f64() * 1000.0)
            .await;

        match result {
            Ok(value) => {
                self.breaker.record_success().await;
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Ok(value)
            }
            Err(e) => {
                self.metrics.increment_counter("executor.failures", 1).await;
                match self.breaker.record_failure().await {
                    BreakerSignal::Tripped => {
                        self.metrics
                            .increment_counter("executor.breaker_trips", 1)
                            .await;
                        error!("execution path circuit breaker tripped after {}", what);
                        self.alerts
                            .emit(
                                AlertLevel::Error,
                                "executor",
                                "execution path circuit breaker tripped",
                            )
                            .await;
                    }
                    BreakerSignal::Warning { errors_in_window } => {
                        self.alerts
                            .emit(
                                AlertLevel::Warning,
                                "executor",
                                format!(
                                    "{} exchange errors in breaker window",
                                    errors_in_window
                                ),
                            )
                            .await;
                    }
                    BreakerSignal::None => {}
                }

                let streak = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if streak == self.config.failure_alert_threshold {
                    self.alerts
                        .emit(
                            AlertLevel::Warning,
                            "executor",
                            format!("{} consecutive exchange call failures", streak),
                        )
                        .await;
                }
                Err(ExecutionError::from(e))
            }
        }
    }

    /// Place an order on the exchange
    pub async fn execute_order(&self, order: &NewOrder) -> Result<OrderId, ExecutionError> {
        let result = self
            .guarded("create_order", "executor.place_latency_ms", || {
                let client = self.client.clone();
                let order = order.clone();
                async move { client.create_order(&order).await }
            })
            .await;
        if result.is_ok() {
            self.metrics
                .increment_counter("executor.orders_placed", 1)
                .await;
        }
        result
    }

    /// Cancel an order on the exchange
    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExecutionError> {
        let result = self
            .guarded("cancel_order", "executor.cancel_latency_ms", || {
                let client = self.client.clone();
                let symbol = symbol.to_string();
                let order_id = order_id.to_string();
                async move { client.cancel_order(&symbol, &order_id).await }
            })
            .await;
        if result.is_ok() {
            self.metrics
                .increment_counter("executor.orders_cancelled", 1)
                .await;
        }
        result
    }

    /// Query order status on the exchange
    pub async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<ExecutionReport, ExecutionError> {
        let result = self
            .guarded("get_order_status", "executor.status_latency_ms", || {
                let client = self.client.clone();
                let symbol = symbol.to_string();
                let order_id = order_id.to_string();
                async move { client.get_order_status(&symbol, &order_id).await }
            })
            .await;
        if result.is_ok() {
            self.metrics
                .increment_counter("executor.status_queries", 1)
                .await;
        }
        result
    }

    /// Fetch the exchange's authoritative order set for the lookback window.
    /// Delegation point for the reconciliation job.
    pub async fn fetch_exchange_orders(
        &self,
        symbol: Option<&str>,
        lookback: Duration,
    ) -> Result<Vec<ExecutionReport>, ExecutionError> {
        self.guarded("get_order_history", "executor.history_latency_ms", || {
            let client = self.client.clone();
            let symbol = symbol.map(|s| s.to_string());
            async move { client.get_order_history(symbol.as_deref(), lookback).await }
        })
        .await
    }

    /// Aggregate counts and latency percentiles since start
    pub async fn get_execution_stats(&self) -> ExecutionStats {
        ExecutionStats {
            orders_placed: self.metrics.counter("executor.orders_placed").await,
            orders_cancelled: self.metrics.counter("executor.orders_cancelled").await,
            status_queries: self.metrics.counter("executor.status_queries").await,
            failures: self.metrics.counter("executor.failures").await,
            circuit_rejections: self.metrics.counter("executor.circuit_rejections").await,
            latency_p50_ms: self
                .metrics
                .histogram_percentile("executor.place_latency_ms", 50.0)
                .await,
            latency_p95_ms: self
                .metrics
                .histogram_percentile("executor.place_latency_ms", 95.0)
                .await,
            latency_p99_ms: self
                .metrics
                .histogram_percentile("executor.place_latency_ms", 99.0)
                .await,
        }
    }
}
