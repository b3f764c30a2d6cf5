pub mod core;
pub mod engine;
pub mod exchanges;
pub mod execution;
pub mod logging;
pub mod monitoring;
pub mod portfolio;
pub mod reconciliation;
pub mod reliability;
pub mod risk;
pub mod types;

pub use core::events::{
    ExecutionReport, MarketEvent, NewOrder, Order, OrderSide, OrderStatus, OrderType, Position,
    PriceTick, RiskViolation, TimeInForce,
};
pub use engine::{EngineConfig, EngineError, OrderTable, TradingEngine};
pub use exchanges::{
    BinanceClient, BinanceMarketStream, BinanceUserStream, ExchangeClient, ExchangeError,
    MarketDataStream, MockExchange, MockMarketStream, MockUserStream, UserDataStream,
};
pub use execution::{ExecutionError, ExecutionStats, ExecutorConfig, ReliableOrderExecutor};
pub use monitoring::{Alert, AlertLevel, AlertManager, MetricsCollector};
pub use portfolio::PortfolioTracker;
pub use reconciliation::{
    ReconciliationConfig, ReconciliationJob, ReconciliationReport, ReconciliationStatus,
    ReconciliationSummary,
};
pub use reliability::{BreakerConfig, BreakerSignal, CircuitBreaker, CircuitState, RetryPolicy};
pub use risk::{RiskConfig, RiskLimits, RiskManager, RiskReport};
pub use types::{Price, Size, Symbol};
