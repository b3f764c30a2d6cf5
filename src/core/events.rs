use crate::types::{Price, Size, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exchange identifier
pub type ExchangeId = String;

/// Order identifier (exchange-assigned once accepted)
pub type OrderId = String;

/// Timestamp in milliseconds
pub type Timestamp = u64;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    StopLimit,
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GoodTillCancelled,
    ImmediateOrCancel,
    FillOrKill,
}

/// Order status lifecycle.
///
/// Pending -> Open -> PartiallyFilled -> Filled
/// Pending | Open | PartiallyFilled -> Cancelled
/// Pending -> Rejected
/// Filled, Cancelled and Rejected are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Whether this status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    /// Whether a transition from `self` to `next` is a legal edge of the
    /// order state machine. Open and PartiallyFilled self-transitions carry
    /// incremental fill updates.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Open) | (Pending, Cancelled) | (Pending, Rejected) => true,
            (Open, Open) | (Open, PartiallyFilled) | (Open, Filled) | (Open, Cancelled) => true,
            (PartiallyFilled, PartiallyFilled)
            | (PartiallyFilled, Filled)
            | (PartiallyFilled, Cancelled) => true,
            _ => false,
        }
    }
}

/// A placement request, before the engine has accepted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: Symbol,
    pub exchange_id: ExchangeId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub price: Option<Price>,
    pub size: Size,
    pub client_order_id: Option<String>,
}

impl NewOrder {
    /// Create a new limit buy order
    pub fn limit_buy(symbol: impl Into<String>, size: Size, price: Price) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            exchange_id: "default".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::GoodTillCancelled,
            price: Some(price),
            size,
            client_order_id: None,
        }
    }

    /// Create a new limit sell order
    pub fn limit_sell(symbol: impl Into<String>, size: Size, price: Price) -> Self {
        Self {
            side: OrderSide::Sell,
            ..Self::limit_buy(symbol, size, price)
        }
    }

    /// Create a new market buy order
    pub fn market_buy(symbol: impl Into<String>, size: Size) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            exchange_id: "default".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::ImmediateOrCancel,
            price: None,
            size,
            client_order_id: None,
        }
    }

    /// Create a new market sell order
    pub fn market_sell(symbol: impl Into<String>, size: Size) -> Self {
        Self {
            side: OrderSide::Sell,
            ..Self::market_buy(symbol, size)
        }
    }

    /// Set the client order ID (builder pattern)
    pub fn with_client_order_id(mut self, client_order_id: String) -> Self {
        self.client_order_id = Some(client_order_id);
        self
    }

    /// Set the exchange ID (builder pattern)
    pub fn with_exchange_id(mut self, exchange_id: impl Into<String>) -> Self {
        self.exchange_id = exchange_id.into();
        self
    }
}

/// An order tracked in the engine's order table.
///
/// Symbol, side, type, size and price are immutable after creation; only
/// status, fill bookkeeping and updated_at mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned id; equal to client_order_id until acceptance
    pub order_id: OrderId,
    pub client_order_id: String,
    pub symbol: Symbol,
    pub exchange_id: ExchangeId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub price: Option<Price>,
    pub size: Size,
    pub filled_size: Size,
    pub average_fill_price: Option<Price>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a Pending order from a placement request
    pub fn from_request(request: &NewOrder, client_order_id: String) -> Self {
        let now = Utc::now();
        Self {
            order_id: client_order_id.clone(),
            client_order_id,
            symbol: request.symbol.clone(),
            exchange_id: request.exchange_id.clone(),
            side: request.side,
            order_type: request.order_type,
            time_in_force: request.time_in_force,
            price: request.price,
            size: request.size,
            filled_size: Size::ZERO,
            average_fill_price: None,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the order is active (pending, open or partially filled)
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Attempt a status transition, refreshing updated_at on success.
    /// Returns false and leaves the order untouched for illegal edges.
    pub fn transition_to(&mut self, next: OrderStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

/// Execution report: the exchange's view of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: OrderId,
    pub client_order_id: Option<String>,
    pub symbol: Symbol,
    pub exchange_id: ExchangeId,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub filled_size: Size,
    pub remaining_size: Size,
    pub average_price: Option<Price>,
    pub timestamp: Timestamp,
}

/// Price tick from the market data stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub exchange_id: ExchangeId,
    pub price: Price,
    pub timestamp: Timestamp,
}

/// A single depth level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    pub size: Size,
}

impl DepthLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }
}

/// Depth book update from the market data stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub symbol: Symbol,
    pub exchange_id: ExchangeId,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub timestamp: Timestamp,
}

/// Market event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    Tick(PriceTick),
    Depth(DepthUpdate),
}

/// Net position in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed quantity: positive long, negative short
    pub size: Size,
    /// Volume-weighted entry price; zero when the position is flat
    pub average_price: Price,
    pub last_price: Price,
}

impl Position {
    pub fn flat(symbol: Symbol) -> Self {
        Self {
            symbol,
            size: Size::ZERO,
            average_price: Price::ZERO,
            last_price: Price::ZERO,
        }
    }

    /// Market value of the position at the last seen price
    pub fn notional(&self) -> rust_decimal::Decimal {
        self.size.value().abs() * self.last_price.value()
    }
}

/// Risk violation: an expected validation outcome, not a fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskViolation {
    pub rule: String,
    pub details: String,
    pub timestamp: Timestamp,
}

impl RiskViolation {
    pub fn new(rule: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            details: details.into(),
            timestamp: Utc::now().timestamp_millis() as u64,
        }
    }
}

impl std::fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule, self.details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_machine_edges() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Open));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Open.can_transition_to(PartiallyFilled));
        assert!(Open.can_transition_to(Filled));
        assert!(PartiallyFilled.can_transition_to(Filled));
        assert!(PartiallyFilled.can_transition_to(Cancelled));

        // No order reaches Filled without first reaching Open
        assert!(!Pending.can_transition_to(Filled));
        assert!(!Pending.can_transition_to(PartiallyFilled));

        // Terminal states admit nothing
        for terminal in [Filled, Cancelled, Rejected] {
            assert!(terminal.is_terminal());
            for next in [Pending, Open, PartiallyFilled, Filled, Cancelled, Rejected] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_order_transition_refreshes_updated_at() {
        let request = NewOrder::market_buy("BTCUSDT", Size::from_str("0.1").unwrap());
        let mut order = Order::from_request(&request, "cid-1".to_string());
        assert_eq!(order.status, OrderStatus::Pending);

        let before = order.updated_at;
        assert!(order.transition_to(OrderStatus::Open));
        assert_eq!(order.status, OrderStatus::Open);
        assert!(order.updated_at >= before);

        // Illegal edge leaves the order untouched
        assert!(!order.transition_to(OrderStatus::Rejected));
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn test_new_order_builders() {
        let price = Price::from_str("50000.0").unwrap();
        let size = Size::from_str("1.0").unwrap();

        let buy = NewOrder::limit_buy("BTCUSDT", size, price)
            .with_client_order_id("client-123".to_string())
            .with_exchange_id("binance");
        assert_eq!(buy.side, OrderSide::Buy);
        assert_eq!(buy.order_type, OrderType::Limit);
        assert_eq!(buy.price, Some(price));
        assert_eq!(buy.exchange_id, "binance");

        let sell = NewOrder::market_sell("ETHUSDT", size);
        assert_eq!(sell.side, OrderSide::Sell);
        assert_eq!(sell.order_type, OrderType::Market);
        assert_eq!(sell.price, None);
    }

    #[test]
    fn test_position_notional() {
        let mut position = Position::flat(Symbol::new("BTCUSDT"));
        assert_eq!(position.notional(), rust_decimal::Decimal::ZERO);

        position.size = Size::from_str("-2.0").unwrap();
        position.last_price = Price::from_str("100.0").unwrap();
        assert_eq!(position.notional(), rust_decimal::Decimal::new(200, 0));
    }
}
