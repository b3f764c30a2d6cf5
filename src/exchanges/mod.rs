pub mod binance;
pub mod error;
pub mod mock;

pub use binance::{BinanceClient, BinanceMarketStream, BinanceUserStream};
pub use error::ExchangeError;
pub use mock::{MockExchange, MockMarketStream, MockUserStream};

use crate::core::events::{ExecutionReport, MarketEvent, NewOrder, OrderId};
use async_trait::async_trait;
use std::time::Duration;

/// Capability interface over an exchange's order endpoints.
///
/// The engine depends only on this trait; adapters exist per exchange
/// (Binance here, mock for tests). Only the order executor is permitted to
/// call it for placement, cancellation and status.
#[async_trait]
pub trait ExchangeClient {
    /// Place a new order, returning the exchange-assigned id
    async fn create_order(&self, order: &NewOrder) -> Result<OrderId, ExchangeError>;

    /// Cancel an existing order
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError>;

    /// Get the current status of an order
    async fn get_order_status(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<ExecutionReport, ExchangeError>;

    /// Get all currently open orders, optionally filtered by symbol
    async fn get_open_orders(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<ExecutionReport>, ExchangeError>;

    /// Get the authoritative order record for the lookback window.
    /// Used by reconciliation; includes terminal orders.
    async fn get_order_history(
        &self,
        symbol: Option<&str>,
        lookback: Duration,
    ) -> Result<Vec<ExecutionReport>, ExchangeError>;

    /// Obtain a session token for the authenticated user-data stream
    async fn get_listen_key(&self) -> Result<String, ExchangeError>;
}

/// Trait for streaming public market data (ticks and depth)
#[async_trait]
pub trait MarketDataStream {
    /// Subscribe to market data for the given symbols
    async fn subscribe(&mut self, symbols: &[&str]) -> Result<(), ExchangeError>;

    /// Unsubscribe from market data for the given symbols
    async fn unsubscribe(&mut self, symbols: &[&str]) -> Result<(), ExchangeError>;

    /// Get the next market event; None when the stream is closed
    async fn next(&mut self) -> Option<Result<MarketEvent, ExchangeError>>;

    /// Check if the stream is connected
    fn is_connected(&self) -> bool;
}

/// Trait for the authenticated execution-report stream
#[async_trait]
pub trait UserDataStream {
    /// Perform the listen-key handshake and open the stream
    async fn connect(&mut self) -> Result<(), ExchangeError>;

    /// Get the next execution report; None when the stream is closed
    async fn next(&mut self) -> Option<Result<ExecutionReport, ExchangeError>>;

    /// Check if the stream is connected
    fn is_connected(&self) -> bool;
}
