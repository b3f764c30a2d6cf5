use crate::core::events::{
    ExecutionReport, MarketEvent, NewOrder, OrderId, OrderStatus,
};
use crate::exchanges::{ExchangeClient, ExchangeError, MarketDataStream, UserDataStream};
use crate::types::Size;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct MockState {
    orders: HashMap<OrderId, ExecutionReport>,
    insertion_order: Vec<OrderId>,
    create_failures: VecDeque<ExchangeError>,
    cancel_failures: VecDeque<ExchangeError>,
    status_failures: VecDeque<ExchangeError>,
    history_failures: VecDeque<ExchangeError>,
    create_calls: u32,
    cancel_calls: u32,
    status_calls: u32,
    auto_fill: bool,
    next_id: u64,
}

/// In-memory exchange for tests.
///
/// Accepts orders as Open (or Filled when auto-fill is on), supports scripted
/// failure queues per endpoint and counts calls so tests can assert on retry
/// behaviour. Clones share state, so a test can keep a handle while the
/// executor owns another.
#[derive(Clone)]
pub struct MockExchange {
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                orders: HashMap::new(),
                insertion_order: Vec::new(),
                create_failures: VecDeque::new(),
                cancel_failures: VecDeque::new(),
                status_failures: VecDeque::new(),
                history_failures: VecDeque::new(),
                create_calls: 0,
                cancel_calls: 0,
                status_calls: 0,
                auto_fill: false,
                next_id: 1,
            })),
        }
    }

    /// Accepted orders report as fully filled immediately
    pub async fn set_auto_fill(&self, enabled: bool) {
        self.state.lock().await.auto_fill = enabled;
    }

    /// Queue `count` copies of `error` against create_order
    pub async fn fail_next_creates(&self, count: u32, error: ExchangeError) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state.create_failures.push_back(error.clone());
        }
    }

    /// Queue `count` copies of `error` against cancel_order
    pub async fn fail_next_cancels(&self, count: u32, error: ExchangeError) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state.cancel_failures.push_back(error.clone());
        }
    }

    /// Queue `count` copies of `error` against get_order_status
    pub async fn fail_next_statuses(&self, count: u32, error: ExchangeError) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state.status_failures.push_back(error.clone());
        }
    }

    /// Queue `count` copies of `error` against the history/open-order reads
    pub async fn fail_next_histories(&self, count: u32, error: ExchangeError) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state.history_failures.push_back(error.clone());
        }
    }

    pub async fn create_calls(&self) -> u32 {
        self.state.lock().await.create_calls
    }

    pub async fn cancel_calls(&self) -> u32 {
        self.state.lock().await.cancel_calls
    }

    pub async fn status_calls(&self) -> u32 {
        self.state.lock().await.status_calls
    }

    /// Overwrite the exchange-side record for an order. Tests use this to
    /// fabricate divergence for reconciliation, or fills to feed through
    /// the user stream.
    pub async fn set_order(&self, report: ExecutionReport) {
        let mut state = self.state.lock().await;
        if !state.orders.contains_key(&report.order_id) {
            state.insertion_order.push(report.order_id.clone());
        }
        state.orders.insert(report.order_id.clone(), report);
    }

    pub async fn order(&self, order_id: &str) -> Option<ExecutionReport> {
        self.state.lock().await.orders.get(order_id).cloned()
    }

    pub async fn remove_order(&self, order_id: &str) -> Option<ExecutionReport> {
        let mut state = self.state.lock().await;
        state.insertion_order.retain(|id| id != order_id);
        state.orders.remove(order_id)
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, ExchangeError> {
        let mut state = self.state.lock().await;
        state.create_calls += 1;
        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }

        let order_id = format!("mock-{}", state.next_id);
        state.next_id += 1;

        let (status, filled, remaining, average_price) = if state.auto_fill {
            (OrderStatus::Filled, order.size, Size::ZERO, order.price)
        } else {
            (OrderStatus::Open, Size::ZERO, order.size, None)
        };
        let report = ExecutionReport {
            order_id: order_id.clone(),
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            exchange_id: order.exchange_id.clone(),
            side: order.side,
            status,
            filled_size: filled,
            remaining_size: remaining,
            average_price,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        };
        state.insertion_order.push(order_id.clone());
        state.orders.insert(order_id.clone(), report);
        Ok(order_id)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let mut state = self.state.lock().await;
        state.cancel_calls += 1;
        if let Some(error) = state.cancel_failures.pop_front() {
            return Err(error);
        }

        match state.orders.get_mut(order_id) {
            Some(report) if !report.status.is_terminal() => {
                report.status = OrderStatus::Cancelled;
                Ok(())
            }
            Some(_) => Err(ExchangeError::InvalidOrder(format!(
                "order {} is no longer active",
                order_id
            ))),
            None => Err(ExchangeError::InvalidOrder(format!(
                "unknown order {}",
                order_id
            ))),
        }
    }

    async fn get_order_status(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<ExecutionReport, ExchangeError> {
        let mut state = self.state.lock().await;
        state.status_calls += 1;
        if let Some(error) = state.status_failures.pop_front() {
            return Err(error);
        }

        state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::InvalidOrder(format!("unknown order {}", order_id)))
    }

    async fn get_open_orders(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<ExecutionReport>, ExchangeError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.history_failures.pop_front() {
            return Err(error);
        }
        Ok(state
            .insertion_order
            .iter()
            .filter_map(|id| state.orders.get(id))
            .filter(|r| !r.status.is_terminal())
            .filter(|r| symbol.is_none_or(|s| r.symbol.as_str() == s))
            .cloned()
            .collect())
    }

    async fn get_order_history(
        &self,
        symbol: Option<&str>,
        _lookback: Duration,
    ) -> Result<Vec<ExecutionReport>, ExchangeError> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.history_failures.pop_front() {
            return Err(error);
        }
        Ok(state
            .insertion_order
            .iter()
            .filter_map(|id| state.orders.get(id))
            .filter(|r| symbol.is_none_or(|s| r.symbol.as_str() == s))
            .cloned()
            .collect())
    }

    async fn get_listen_key(&self) -> Result<String, ExchangeError> {
        Ok("mock-listen-key".to_string())
    }
}

/// Scripted market-data stream backed by an unbounded channel. Tests hold
/// the sender; the stream ends when the sender drops.
pub struct MockMarketStream {
    events: mpsc::UnboundedReceiver<Result<MarketEvent, ExchangeError>>,
    subscriptions: Vec<String>,
    connected: bool,
}

impl MockMarketStream {
    pub fn channel() -> (
        mpsc::UnboundedSender<Result<MarketEvent, ExchangeError>>,
        Self,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                events: rx,
                subscriptions: Vec::new(),
                connected: true,
            },
        )
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }
}

#[async_trait]
impl MarketDataStream for MockMarketStream {
    async fn subscribe(&mut self, symbols: &[&str]) -> Result<(), ExchangeError> {
        for symbol in symbols {
            if !self.subscriptions.iter().any(|s| s == symbol) {
                self.subscriptions.push(symbol.to_string());
            }
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, symbols: &[&str]) -> Result<(), ExchangeError> {
        self.subscriptions.retain(|s| !symbols.contains(&s.as_str()));
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<MarketEvent, ExchangeError>> {
        self.events.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Scripted user-data stream; connect failures can be queued to exercise
/// startup retry.
pub struct MockUserStream {
    reports: mpsc::UnboundedReceiver<Result<ExecutionReport, ExchangeError>>,
    connect_failures: VecDeque<ExchangeError>,
    connected: bool,
}

impl MockUserStream {
    pub fn channel() -> (
        mpsc::UnboundedSender<Result<ExecutionReport, ExchangeError>>,
        Self,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                reports: rx,
                connect_failures: VecDeque::new(),
                connected: false,
            },
        )
    }

    pub fn fail_next_connects(&mut self, count: u32, error: ExchangeError) {
        for _ in 0..count {
            self.connect_failures.push_back(error.clone());
        }
    }
}

#[async_trait]
impl UserDataStream for MockUserStream {
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        if let Some(error) = self.connect_failures.pop_front() {
            return Err(error);
        }
        self.connected = true;
        Ok(())
    }

    async fn next(&mut self) -> Option<Result<ExecutionReport, ExchangeError>> {
        self.reports.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
