use crate::core::events::{OrderSide, Position};
use crate::types::{Price, Size, Symbol};
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct PortfolioInner {
    positions: HashMap<Symbol, Position>,
    cash: Decimal,
    realized_pnl: Decimal,
    peak_equity: Decimal,
}

impl PortfolioInner {
    fn equity(&self) -> Decimal {
        let marked: Decimal = self
            .positions
            .values()
            .map(|p| p.size.value() * p.last_price.value())
            .sum();
        self.cash + marked
    }
}

/// Tracks open positions, realized/unrealized PnL and account equity.
/// Mutated only by fill events and market prices; positions are zeroed when
/// flat, never removed.
pub struct PortfolioTracker {
    inner: RwLock<PortfolioInner>,
}

impl PortfolioTracker {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            inner: RwLock::new(PortfolioInner {
                positions: HashMap::new(),
                cash: starting_cash,
                realized_pnl: Decimal::ZERO,
                peak_equity: starting_cash,
            }),
        }
    }

    /// Apply a fill to the position for `symbol`.
    ///
    /// `size` is the unsigned fill quantity; direction comes from `side`.
    /// Increasing a position moves the volume-weighted entry price; reducing
    /// realizes PnL against it; a fill larger than the open quantity flips
    /// the position, opening the remainder at the fill price.
    pub async fn apply_fill(&self, symbol: &Symbol, side: OrderSide, size: Size, price: Price) {
        let fill_qty = size.value().abs();
        if fill_qty.is_zero() {
            return;
        }
        let signed = match side {
            OrderSide::Buy => fill_qty,
            OrderSide::Sell => -fill_qty,
        };

        let mut inner = self.inner.write().await;
        let position = inner
            .positions
            .entry(symbol.clone())
            .or_insert_with(|| Position::flat(symbol.clone()));

        let old_qty = position.size.value();
        let new_qty = old_qty + signed;
        let mut realized = Decimal::ZERO;

        if old_qty.is_zero() || (old_qty.is_sign_positive() == signed.is_sign_positive()) {
            // Same-direction increase: VWAP the entry price
            let old_cost = old_qty.abs() * position.average_price.value();
            let add_cost = fill_qty * price.value();
            position.average_price = Price::new((old_cost + add_cost) / new_qty.abs());
        } else if signed.abs() <= old_qty.abs() {
            // Reduction: realize against the entry price, sign by direction
            let closed = signed.abs();
            let per_unit = price.value() - position.average_price.value();
            realized = if old_qty.is_sign_positive() {
                per_unit * closed
            } else {
                -per_unit * closed
            };
            if new_qty.is_zero() {
                position.average_price = Price::ZERO;
            }
        } else {
            // Reversal: close the whole old position, open the remainder
            let per_unit = price.value() - position.average_price.value();
            realized = if old_qty.is_sign_positive() {
                per_unit * old_qty.abs()
            } else {
                -per_unit * old_qty.abs()
            };
            position.average_price = price;
        }

        position.size = Size::new(new_qty);
        position.last_price = price;
        debug!(
            "fill applied: {} {:?} {} @ {} -> position {} (realized {})",
            symbol, side, fill_qty, price, new_qty, realized
        );

        // Cash leg of the fill
        match side {
            OrderSide::Buy => inner.cash -= fill_qty * price.value(),
            OrderSide::Sell => inner.cash += fill_qty * price.value(),
        }
        inner.realized_pnl += realized;

        let equity = inner.equity();
        if equity > inner.peak_equity {
            inner.peak_equity = equity;
        }
    }

    /// Mark a position to the latest market price
    pub async fn update_market_price(&self, symbol: &Symbol, price: Price) {
        let mut inner = self.inner.write().await;
        if let Some(position) = inner.positions.get_mut(symbol) {
            position.last_price = price;
        }
        let equity = inner.equity();
        if equity > inner.peak_equity {
            inner.peak_equity = equity;
        }
    }

    /// Current account equity: cash plus marked position value
    pub async fn account_equity(&self) -> Price {
        Price::new(self.inner.read().await.equity())
    }

    /// Gross exposure: sum of absolute marked position values
    pub async fn total_exposure(&self) -> Decimal {
        let inner = self.inner.read().await;
        inner.positions.values().map(|p| p.notional()).sum()
    }

    pub async fn realized_pnl(&self) -> Decimal {
        self.inner.read().await.realized_pnl
    }

    /// Unrealized PnL across open positions
    pub async fn unrealized_pnl(&self) -> Decimal {
        let inner = self.inner.read().await;
        inner
            .positions
            .values()
            .filter(|p| !p.size.is_zero())
            .map(|p| (p.last_price.value() - p.average_price.value()) * p.size.value())
            .sum()
    }

    /// Drawdown from peak equity, in percent (0 when at or above peak)
    pub async fn drawdown_pct(&self) -> Decimal {
        let inner = self.inner.read().await;
        if inner.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let drop = inner.peak_equity - inner.equity();
        if drop <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            drop / inner.peak_equity * Decimal::ONE_HUNDRED
        }
    }

    pub async fn position(&self, symbol: &str) -> Option<Position> {
        self.inner.read().await.positions.get(symbol).cloned()
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.inner.read().await.positions.values().cloned().collect()
    }
}
