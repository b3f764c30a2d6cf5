use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use trade_engine::{
    AlertManager, BreakerConfig, CircuitState, EngineConfig, EngineError, ExchangeError,
    ExecutionError, ExecutionReport, ExecutorConfig, MarketEvent, MetricsCollector, MockExchange,
    MockMarketStream, MockUserStream, NewOrder, OrderStatus, PortfolioTracker, Price, PriceTick,
    ReliableOrderExecutor, RetryPolicy, RiskConfig, RiskLimits, RiskManager, Size, Symbol,
    TradingEngine,
};

struct Harness {
    engine: Arc<TradingEngine>,
    exchange: MockExchange,
    metrics: Arc<MetricsCollector>,
    portfolio: Arc<PortfolioTracker>,
    market_tx: mpsc::UnboundedSender<Result<MarketEvent, ExchangeError>>,
    user_tx: mpsc::UnboundedSender<Result<ExecutionReport, ExchangeError>>,
}

async fn start_engine(executor_config: ExecutorConfig) -> Harness {
    let exchange = MockExchange::new();
    let metrics = Arc::new(MetricsCollector::new());
    let alerts = Arc::new(AlertManager::default());
    let portfolio = Arc::new(PortfolioTracker::new("100000".parse().unwrap()));
    let risk = Arc::new(RiskManager::new(
        RiskConfig::default(),
        RiskLimits::default(),
        portfolio.clone(),
        alerts.clone(),
    ));
    let executor = Arc::new(ReliableOrderExecutor::new(
        Arc::new(exchange.clone()),
        executor_config,
        metrics.clone(),
        alerts.clone(),
    ));
    let engine = Arc::new(TradingEngine::new(
        EngineConfig {
            symbols: vec![Symbol::new("BTCUSDT")],
            ..EngineConfig::default()
        },
        executor,
        risk,
        portfolio.clone(),
        metrics.clone(),
        alerts,
    ));

    let (market_tx, market_stream) = MockMarketStream::channel();
    let (user_tx, user_stream) = MockUserStream::channel();
    engine
        .start(Box::new(market_stream), Box::new(user_stream))
        .await
        .unwrap();

    Harness {
        engine,
        exchange,
        metrics,
        portfolio,
        market_tx,
        user_tx,
    }
}

fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        request_timeout: Duration::from_millis(200),
        retry: RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
            multiplier: 2.0,
        },
        breaker: BreakerConfig::default(),
        failure_alert_threshold: 5,
    }
}

fn tick(price: &str) -> Result<MarketEvent, ExchangeError> {
    Ok(MarketEvent::Tick(PriceTick {
        symbol: Symbol::new("BTCUSDT"),
        exchange_id: "mock".to_string(),
        price: Price::from_str(price).unwrap(),
        timestamp: 1,
    }))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// Scenario A: market buy fills end to end and lands in the portfolio
#[tokio::test]
async fn market_buy_fills_and_updates_portfolio() {
    let h = start_engine(fast_executor_config()).await;

    h.market_tx.send(tick("50000")).unwrap();
    settle().await;
    assert_eq!(
        h.engine.last_price("BTCUSDT"),
        Some(Price::from_str("50000").unwrap())
    );

    let order = h
        .engine
        .place_order(NewOrder::market_buy(
            "BTCUSDT",
            Size::from_str("0.1").unwrap(),
        ))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Open);

    h.user_tx
        .send(Ok(ExecutionReport {
            order_id: order.order_id.clone(),
            client_order_id: Some(order.client_order_id.clone()),
            symbol: order.symbol.clone(),
            exchange_id: order.exchange_id.clone(),
            side: order.side,
            status: OrderStatus::Filled,
            filled_size: Size::from_str("0.1").unwrap(),
            remaining_size: Size::ZERO,
            average_price: Some(Price::from_str("50010").unwrap()),
            timestamp: 2,
        }))
        .unwrap();
    settle().await;

    let row = h.engine.order(&order.client_order_id).await.unwrap();
    assert_eq!(row.status, OrderStatus::Filled);

    let position = h.portfolio.position("BTCUSDT").await.unwrap();
    assert_eq!(position.size, Size::from_str("0.1").unwrap());
    assert_eq!(position.average_price, Price::from_str("50010").unwrap());

    h.engine.stop().await;
}

// Scenario B: a risk-rejected order never generates an exchange call
#[tokio::test]
async fn oversized_order_rejected_without_exchange_call() {
    let h = start_engine(fast_executor_config()).await;
    h.market_tx.send(tick("50000")).unwrap();
    settle().await;

    // Notional 10 x 50_000 = 500_000 >> 10% of 100_000 equity
    let err = h
        .engine
        .place_order(NewOrder::market_buy(
            "BTCUSDT",
            Size::from_str("10").unwrap(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RiskRejected(_)));
    assert_eq!(h.exchange.create_calls().await, 0);
    assert_eq!(h.metrics.counter("orders.rejected").await, 1);

    h.engine.stop().await;
}

// Scenario C: three timeouts then success reaches Open, with latency
// consistent with the backoff schedule (10 + 20 + 40 ms minimum)
#[tokio::test]
async fn transient_timeouts_retried_until_open() {
    let h = start_engine(fast_executor_config()).await;
    h.market_tx.send(tick("50000")).unwrap();
    settle().await;

    h.exchange
        .fail_next_creates(3, ExchangeError::Timeout(Duration::from_millis(1)))
        .await;

    let started = Instant::now();
    let order = h
        .engine
        .place_order(NewOrder::market_buy(
            "BTCUSDT",
            Size::from_str("0.1").unwrap(),
        ))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(h.exchange.create_calls().await, 4);
    assert!(
        elapsed >= Duration::from_millis(70),
        "elapsed {:?} is shorter than the backoff schedule",
        elapsed
    );

    h.engine.stop().await;
}

// Scenario D: twenty consecutive failures trip the breaker; while Open,
// placements fail fast without touching the exchange until cool-down
#[tokio::test]
async fn breaker_opens_after_consecutive_failures_then_recovers() {
    let config = ExecutorConfig {
        request_timeout: Duration::from_millis(200),
        // No retries: every placement is exactly one exchange attempt
        retry: RetryPolicy {
            max_retries: 0,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
        },
        breaker: BreakerConfig {
            window: Duration::from_secs(300),
            error_threshold: 20,
            warning_threshold: 10,
            cool_down: Duration::from_millis(80),
        },
        failure_alert_threshold: 50,
    };
    let h = start_engine(config).await;
    h.market_tx.send(tick("50000")).unwrap();
    settle().await;

    h.exchange
        .fail_next_creates(20, ExchangeError::ConnectionReset("exchange down".into()))
        .await;
    let request = NewOrder::market_buy("BTCUSDT", Size::from_str("0.01").unwrap());

    for _ in 0..20 {
        let err = h.engine.place_order(request.clone()).await.unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)));
    }
    assert_eq!(h.exchange.create_calls().await, 20);

    // Open: fail fast, no new exchange call
    let err = h.engine.place_order(request.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Execution(ExecutionError::CircuitOpen)
    ));
    assert_eq!(h.exchange.create_calls().await, 20);

    // After cool-down the single trial call goes through and closes it
    tokio::time::sleep(Duration::from_millis(100)).await;
    let order = h.engine.place_order(request).await.unwrap();
    assert_eq!(order.status, OrderStatus::Open);

    h.engine.stop().await;
}

// Startup failure after retry exhaustion is fatal
#[tokio::test]
async fn startup_fails_when_user_stream_never_connects() {
    let exchange = MockExchange::new();
    let metrics = Arc::new(MetricsCollector::new());
    let alerts = Arc::new(AlertManager::default());
    let portfolio = Arc::new(PortfolioTracker::new("1000".parse().unwrap()));
    let risk = Arc::new(RiskManager::new(
        RiskConfig::default(),
        RiskLimits::default(),
        portfolio.clone(),
        alerts.clone(),
    ));
    let executor = Arc::new(ReliableOrderExecutor::new(
        Arc::new(exchange),
        fast_executor_config(),
        metrics.clone(),
        alerts.clone(),
    ));
    let engine = TradingEngine::new(
        EngineConfig {
            symbols: vec![Symbol::new("BTCUSDT")],
            startup_retry: RetryPolicy {
                max_retries: 1,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                multiplier: 2.0,
            },
            ..EngineConfig::default()
        },
        executor,
        risk,
        portfolio,
        metrics,
        alerts,
    );

    let (_market_tx, market_stream) = MockMarketStream::channel();
    let (_user_tx, mut user_stream) = MockUserStream::channel();
    user_stream.fail_next_connects(5, ExchangeError::ConnectionReset("refused".into()));

    let err = engine
        .start(Box::new(market_stream), Box::new(user_stream))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Startup(_)));
}

// Price ticks feed the symbol breaker through the risk manager
#[tokio::test]
async fn wild_price_moves_trip_the_symbol_breaker() {
    let h = start_engine(fast_executor_config()).await;

    h.market_tx.send(tick("100")).unwrap();
    let mut price = 100.0f64;
    for _ in 0..RiskConfig::default().breaker.error_threshold {
        price *= 1.2;
        h.market_tx.send(tick(&format!("{:.2}", price))).unwrap();
    }
    settle().await;

    let report = h.engine.risk_report().await;
    assert_eq!(
        report.breaker_states.get(&Symbol::new("BTCUSDT")),
        Some(&CircuitState::Open)
    );

    // Placements for the symbol are rejected while the breaker is Open
    let err = h
        .engine
        .place_order(NewOrder::market_buy(
            "BTCUSDT",
            Size::from_str("0.001").unwrap(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RiskRejected(_)));

    h.engine.stop().await;
}
