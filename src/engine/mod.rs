pub mod order_table;

pub use order_table::OrderTable;

use crate::core::events::{
    DepthUpdate, ExecutionReport, MarketEvent, NewOrder, Order, OrderStatus, PriceTick,
    RiskViolation,
};
use crate::exchanges::{MarketDataStream, UserDataStream};
use crate::execution::{ExecutionError, ExecutionStats, ReliableOrderExecutor};
use crate::monitoring::{AlertLevel, AlertManager, MetricsCollector};
use crate::portfolio::PortfolioTracker;
use crate::reliability::RetryPolicy;
use crate::risk::{RiskManager, RiskReport};
use crate::types::{Price, Size, Symbol};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Engine-level errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Risk validation rejected the order; expected, non-fatal
    #[error("order rejected by risk checks: {0}")]
    RiskRejected(RiskViolation),

    #[error("unknown order id {0}")]
    UnknownOrder(String),

    #[error("duplicate client order id {0}")]
    DuplicateOrderId(String),

    #[error("illegal status transition for order {order_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("engine startup failed: {0}")]
    Startup(String),
}

pub type OrderListener = Box<dyn Fn(&Order) + Send + Sync>;
pub type PriceListener = Box<dyn Fn(&PriceTick) + Send + Sync>;
pub type DepthListener = Box<dyn Fn(&DepthUpdate) + Send + Sync>;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub exchange_id: String,
    /// Symbols subscribed at startup; each gets a registered breaker
    pub symbols: Vec<Symbol>,
    /// Retry schedule for the startup subscribe/connect handshakes
    pub startup_retry: RetryPolicy,
    pub risk_monitor_interval: Duration,
    pub metrics_report_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exchange_id: "binance".to_string(),
            symbols: Vec::new(),
            startup_retry: RetryPolicy::default(),
            risk_monitor_interval: Duration::from_secs(1),
            metrics_report_interval: Duration::from_secs(60),
        }
    }
}

/// Shared state reachable from the engine's background tasks
struct EngineCore {
    orders: Arc<OrderTable>,
    portfolio: Arc<PortfolioTracker>,
    risk: Arc<RiskManager>,
    metrics: Arc<MetricsCollector>,
    alerts: Arc<AlertManager>,
    prices: DashMap<Symbol, Price>,
    depths: DashMap<Symbol, DepthUpdate>,
    order_listeners: RwLock<Vec<OrderListener>>,
    price_listeners: RwLock<Vec<PriceListener>>,
    depth_listeners: RwLock<Vec<DepthListener>>,
}

impl EngineCore {
    async fn handle_market_event(&self, event: MarketEvent) {
        match event {
            MarketEvent::Tick(tick) => {
                self.prices.insert(tick.symbol.clone(), tick.price);
                self.portfolio
                    .update_market_price(&tick.symbol, tick.price)
                    .await;
                self.risk.on_price(&tick.symbol, tick.price).await;

                let listeners = self.price_listeners.read().await;
                for listener in listeners.iter() {
                    if std::panic::catch_unwind(AssertUnwindSafe(|| listener(&tick))).is_err() {
                        warn!("price listener panicked, continuing with the rest");
                    }
                }
            }
            MarketEvent::Depth(update) => {
                self.depths.insert(update.symbol.clone(), update.clone());

                let listeners = self.depth_listeners.read().await;
                for listener in listeners.iter() {
                    if std::panic::catch_unwind(AssertUnwindSafe(|| listener(&update))).is_err() {
                        warn!("depth listener panicked, continuing with the rest");
                    }
                }
            }
        }
    }

    /// Apply one execution report to the order table, the portfolio and the
    /// order listeners. Reports for unknown orders and illegal transitions
    /// are counted and dropped, never silently ignored.
    async fn handle_execution_report(&self, report: ExecutionReport) {
        let mut local = None;
        if let Some(client_id) = &report.client_order_id {
            local = self.orders.get(client_id).await;
        }
        if local.is_none() {
            local = self.orders.get(&report.order_id).await;
        }
        let Some(order) = local else {
            warn!(
                "execution report for unknown order {} ({} {:?}), dropping",
                report.order_id, report.symbol, report.status
            );
            self.metrics.increment_counter("orders.unknown_fill", 1).await;
            return;
        };

        // Transition legality is checked under the table lock
        let mut applied = false;
        let mut previous_filled = Size::ZERO;
        let updated = self
            .orders
            .update(&order.client_order_id, |row| {
                if !row.status.can_transition_to(report.status) {
                    return;
                }
                previous_filled = row.filled_size;
                if row.order_id == row.client_order_id && row.order_id != report.order_id {
                    row.order_id = report.order_id.clone();
                }
                row.transition_to(report.status);
                row.filled_size = report.filled_size;
                if report.average_price.is_some() {
                    row.average_fill_price = report.average_price;
                }
                applied = true;
            })
            .await;
        let Some(updated) = updated else {
            self.metrics.increment_counter("orders.unknown_fill", 1).await;
            return;
        };
        if !applied {
            warn!(
                "dropping illegal transition {:?} -> {:?} for order {}",
                order.status, report.status, order.client_order_id
            );
            self.metrics
                .increment_counter("orders.invalid_transition", 1)
                .await;
            return;
        }

        let fill_delta = report.filled_size.value() - previous_filled.value();
        if fill_delta > Decimal::ZERO {
            let fill_price = report
                .average_price
                .or(updated.price)
                .or_else(|| self.prices.get(&updated.symbol).map(|p| *p));
            match fill_price {
                Some(price) => {
                    self.portfolio
                        .apply_fill(&updated.symbol, updated.side, Size::new(fill_delta), price)
                        .await;
                }
                None => warn!(
                    "fill for order {} carries no price and none is cached, skipping",
                    updated.client_order_id
                ),
            }
        }
        if report.status == OrderStatus::Filled {
            self.metrics.increment_counter("orders.filled", 1).await;
        }

        self.notify_order(&updated).await;
    }

    /// Notify order listeners in registration order; a panicking listener
    /// must not prevent delivery to the rest.
    async fn notify_order(&self, order: &Order) {
        let listeners = self.order_listeners.read().await;
        for listener in listeners.iter() {
            if std::panic::catch_unwind(AssertUnwindSafe(|| listener(order))).is_err() {
                warn!("order listener panicked, continuing with the rest");
            }
        }
    }
}

/// The trading engine: owns the order table and market-data subscriptions,
/// routes placements through risk and the executor, and applies execution
/// reports back onto the table and the portfolio.
pub struct TradingEngine {
    config: EngineConfig,
    core: Arc<EngineCore>,
    executor: Arc<ReliableOrderExecutor>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        executor: Arc<ReliableOrderExecutor>,
        risk: Arc<RiskManager>,
        portfolio: Arc<PortfolioTracker>,
        metrics: Arc<MetricsCollector>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            core: Arc::new(EngineCore {
                orders: Arc::new(OrderTable::new()),
                portfolio,
                risk,
                metrics,
                alerts,
                prices: DashMap::new(),
                depths: DashMap::new(),
                order_listeners: RwLock::new(Vec::new()),
                price_listeners: RwLock::new(Vec::new()),
                depth_listeners: RwLock::new(Vec::new()),
            }),
            executor,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe market data, connect the user stream and spawn the engine
    /// tasks. Stream handshakes run under the startup retry policy; failure
    /// after exhaustion is fatal.
    pub async fn start(
        &self,
        mut market_stream: Box<dyn MarketDataStream + Send>,
        mut user_stream: Box<dyn UserDataStream + Send>,
    ) -> Result<(), EngineError> {
        let symbols: Vec<String> = self
            .config
            .symbols
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let retry = &self.config.startup_retry;

        let mut attempt = 0;
        loop {
            let refs: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
            match market_stream.subscribe(&refs).await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    warn!("market-data subscribe failed, retrying: {}", e);
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(EngineError::Startup(format!(
                        "market-data subscription failed: {}",
                        e
                    )))
                }
            }
        }

        let mut attempt = 0;
        loop {
            match user_stream.connect().await {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    warn!("user stream connect failed, retrying: {}", e);
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(EngineError::Startup(format!(
                        "user stream connection failed: {}",
                        e
                    )))
                }
            }
        }

        for symbol in &self.config.symbols {
            self.core.risk.register_circuit_breaker(symbol).await;
        }

        let mut tasks = self.tasks.lock().await;

        let core = self.core.clone();
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.config.risk_monitor_interval;
        tasks.push((
            "risk-monitor",
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                let mut breached = false;
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {}
                    }
                    let limits = core.risk.limits().await;
                    let drawdown = core.portfolio.drawdown_pct().await;
                    let equity = core.portfolio.account_equity().await;
                    let exposure = core.portfolio.total_exposure().await;

                    core.metrics
                        .set_gauge("portfolio.equity", equity.value().to_f64().unwrap_or(0.0))
                        .await;
                    core.metrics
                        .set_gauge("portfolio.exposure", exposure.to_f64().unwrap_or(0.0))
                        .await;
                    core.metrics
                        .set_gauge("risk.drawdown_pct", drawdown.to_f64().unwrap_or(0.0))
                        .await;

                    if drawdown >= limits.max_drawdown_pct {
                        if !breached {
                            core.alerts
                                .emit(
                                    AlertLevel::Critical,
                                    "risk",
                                    format!(
                                        "drawdown {}% breached the {}% limit",
                                        drawdown.round_dp(2),
                                        limits.max_drawdown_pct
                                    ),
                                )
                                .await;
                            breached = true;
                        }
                    } else {
                        breached = false;
                    }
                }
                debug!("risk monitor stopped");
            }),
        ));

        let core = self.core.clone();
        let mut shutdown = self.shutdown.subscribe();
        let interval = self.config.metrics_report_interval;
        tasks.push((
            "metrics-report",
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {}
                    }
                    let snapshot = core.metrics.snapshot().await;
                    for metric in &snapshot {
                        debug!("metric {} = {:?}", metric.name, metric.value);
                    }
                    info!("exported {} metric series", snapshot.len());
                }
                debug!("metrics reporter stopped");
            }),
        ));

        let core = self.core.clone();
        let mut shutdown = self.shutdown.subscribe();
        tasks.push((
            "market-data",
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        event = market_stream.next() => match event {
                            Some(Ok(event)) => core.handle_market_event(event).await,
                            Some(Err(e)) => {
                                warn!("market stream error: {}", e);
                                core.metrics.increment_counter("stream.market_errors", 1).await;
                            }
                            None => {
                                warn!("market stream ended");
                                break;
                            }
                        }
                    }
                }
                debug!("market-data task stopped");
            }),
        ));

        let core = self.core.clone();
        let mut shutdown = self.shutdown.subscribe();
        tasks.push((
            "user-data",
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        report = user_stream.next() => match report {
                            Some(Ok(report)) => core.handle_execution_report(report).await,
                            Some(Err(e)) => {
                                warn!("user stream error: {}", e);
                                core.metrics.increment_counter("stream.user_errors", 1).await;
                            }
                            None => {
                                warn!("user stream ended");
                                break;
                            }
                        }
                    }
                }
                debug!("user-data task stopped");
            }),
        ));

        info!(
            "trading engine started for {} symbols on {}",
            symbols.len(),
            self.config.exchange_id
        );
        Ok(())
    }

    /// Stop risk monitoring and metrics export, then the stream tasks, in
    /// that order; every step is attempted regardless of earlier failures.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let mut tasks = self.tasks.lock().await;
        for (name, task) in tasks.drain(..) {
            if let Err(e) = task.await {
                error!("{} task failed during shutdown: {}", name, e);
            }
        }
        info!("trading engine stopped");
    }

    /// Validate and place an order.
    ///
    /// Risk rejection marks the row Rejected and never reaches the executor;
    /// executor failure also marks the row Rejected and propagates the error.
    pub async fn place_order(&self, request: NewOrder) -> Result<Order, EngineError> {
        let mut request = request;
        let client_order_id = request
            .client_order_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        request.client_order_id = Some(client_order_id.clone());

        let order = Order::from_request(&request, client_order_id.clone());
        if !self.core.orders.insert(order).await {
            warn!("rejecting duplicate client order id {}", client_order_id);
            return Err(EngineError::DuplicateOrderId(client_order_id));
        }

        let reference_price = request
            .price
            .or_else(|| self.core.prices.get(&request.symbol).map(|p| *p));
        let equity = self.core.portfolio.account_equity().await;
        let validation = match reference_price {
            Some(price) => self.core.risk.validate_order(&request, price, equity).await,
            None => Err(RiskViolation::new(
                "NoReferencePrice",
                format!("no price observed for {}", request.symbol),
            )),
        };
        if let Err(violation) = validation {
            let rejected = self
                .core
                .orders
                .update(&client_order_id, |row| {
                    row.transition_to(OrderStatus::Rejected);
                })
                .await;
            self.core.metrics.increment_counter("orders.rejected", 1).await;
            self.core
                .alerts
                .emit(
                    AlertLevel::Warning,
                    "engine",
                    format!("order rejected: {}", violation),
                )
                .await;
            if let Some(rejected) = rejected {
                self.core.notify_order(&rejected).await;
            }
            return Err(EngineError::RiskRejected(violation));
        }

        match self.executor.execute_order(&request).await {
            Ok(exchange_id) => {
                let updated = self
                    .core
                    .orders
                    .update(&client_order_id, |row| {
                        row.order_id = exchange_id.clone();
                        row.transition_to(OrderStatus::Open);
                    })
                    .await
                    .ok_or_else(|| EngineError::UnknownOrder(client_order_id.clone()))?;
                self.core.metrics.increment_counter("orders.placed", 1).await;
                info!(
                    "order {} accepted as {} ({} {:?} {})",
                    client_order_id, exchange_id, updated.symbol, updated.side, updated.size
                );
                self.core.notify_order(&updated).await;
                Ok(updated)
            }
            Err(e) => {
                let rejected = self
                    .core
                    .orders
                    .update(&client_order_id, |row| {
                        row.transition_to(OrderStatus::Rejected);
                    })
                    .await;
                self.core.metrics.increment_counter("orders.failed", 1).await;
                warn!("placement of {} failed: {}", client_order_id, e);
                if let Some(rejected) = rejected {
                    self.core.notify_order(&rejected).await;
                }
                Err(EngineError::Execution(e))
            }
        }
    }

    /// Cancel an order by client or exchange id.
    ///
    /// Cancelling an already-Cancelled order is an idempotent success;
    /// Filled/Rejected orders report an illegal transition.
    pub async fn cancel_order(&self, id: &str) -> Result<Order, EngineError> {
        let order = self
            .core
            .orders
            .get(id)
            .await
            .ok_or_else(|| EngineError::UnknownOrder(id.to_string()))?;

        match order.status {
            OrderStatus::Cancelled => Ok(order),
            OrderStatus::Filled | OrderStatus::Rejected => Err(EngineError::InvalidTransition {
                order_id: order.client_order_id.clone(),
                from: order.status,
                to: OrderStatus::Cancelled,
            }),
            _ => {
                self.executor
                    .cancel_order(order.symbol.as_str(), &order.order_id)
                    .await?;
                let updated = self
                    .core
                    .orders
                    .update(&order.client_order_id, |row| {
                        row.transition_to(OrderStatus::Cancelled);
                    })
                    .await
                    .ok_or_else(|| EngineError::UnknownOrder(id.to_string()))?;
                self.core
                    .metrics
                    .increment_counter("orders.cancelled", 1)
                    .await;
                self.core.notify_order(&updated).await;
                Ok(updated)
            }
        }
    }

    /// Dynamic position size at current account equity
    pub async fn calculate_position_size(
        &self,
        symbol: &str,
        risk_pct: Option<Decimal>,
        stop_loss_pct: Option<Decimal>,
    ) -> Size {
        let equity = self.core.portfolio.account_equity().await;
        self.core
            .risk
            .calculate_position_size(symbol, equity, risk_pct, stop_loss_pct)
            .await
    }

    pub async fn add_order_listener(&self, listener: OrderListener) {
        self.core.order_listeners.write().await.push(listener);
    }

    pub async fn add_price_listener(&self, listener: PriceListener) {
        self.core.price_listeners.write().await.push(listener);
    }

    pub async fn add_depth_listener(&self, listener: DepthListener) {
        self.core.depth_listeners.write().await.push(listener);
    }

    pub async fn order(&self, id: &str) -> Option<Order> {
        self.core.orders.get(id).await
    }

    pub async fn active_orders(&self) -> Vec<Order> {
        self.core.orders.active_orders().await
    }

    /// Shared handle to the order table (reconciliation reads snapshots)
    pub fn order_table(&self) -> Arc<OrderTable> {
        self.core.orders.clone()
    }

    pub fn last_price(&self, symbol: &str) -> Option<Price> {
        self.core.prices.get(symbol).map(|p| *p)
    }

    pub fn last_depth(&self, symbol: &str) -> Option<DepthUpdate> {
        self.core.depths.get(symbol).map(|d| d.clone())
    }

    pub async fn risk_report(&self) -> RiskReport {
        self.core.risk.risk_report().await
    }

    pub async fn execution_stats(&self) -> ExecutionStats {
        self.executor.get_execution_stats().await
    }
}
