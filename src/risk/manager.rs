use crate::core::events::{NewOrder, RiskViolation};
use crate::monitoring::{AlertLevel, AlertManager};
use crate::portfolio::PortfolioTracker;
use crate::reliability::{BreakerConfig, BreakerSignal, CircuitBreaker, CircuitState};
use crate::risk::limits::RiskLimits;
use crate::types::{Price, Size, Symbol};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Risk manager configuration
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Breaker settings applied to every registered symbol
    pub breaker: BreakerConfig,
    /// Single-tick move (percent) counted as a breaker failure
    pub max_price_move_pct: Decimal,
    /// Ticks retained per symbol for realized-volatility estimates
    pub price_history_len: usize,
    /// Realized volatility (pct) below which no sizing penalty applies
    pub reference_volatility_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig::default(),
            max_price_move_pct: Decimal::new(5, 0),
            price_history_len: 120,
            reference_volatility_pct: 2.0,
        }
    }
}

/// Read-only snapshot of risk state versus limits
#[derive(Debug, Clone)]
pub struct RiskReport {
    pub breaker_states: HashMap<Symbol, CircuitState>,
    pub total_exposure: Decimal,
    pub exposure_limit: Decimal,
    pub drawdown_pct: Decimal,
    pub limits: RiskLimits,
    pub generated_at: DateTime<Utc>,
}

/// Gatekeeper for order placement and source of dynamic position sizing.
///
/// Owns the per-symbol circuit breakers it registers; nothing else mutates
/// them (operator reset excepted).
pub struct RiskManager {
    config: RiskConfig,
    limits: RwLock<RiskLimits>,
    breakers: RwLock<HashMap<Symbol, Arc<CircuitBreaker>>>,
    price_history: RwLock<HashMap<Symbol, VecDeque<Price>>>,
    portfolio: Arc<PortfolioTracker>,
    alerts: Arc<AlertManager>,
}

impl RiskManager {
    pub fn new(
        config: RiskConfig,
        limits: RiskLimits,
        portfolio: Arc<PortfolioTracker>,
        alerts: Arc<AlertManager>,
    ) -> Self {
        Self {
            config,
            limits: RwLock::new(limits),
            breakers: RwLock::new(HashMap::new()),
            price_history: RwLock::new(HashMap::new()),
            portfolio,
            alerts,
        }
    }

    /// Immutable snapshot of the current limits
    pub async fn limits(&self) -> RiskLimits {
        self.limits.read().await.clone()
    }

    /// Administrative setter for a numeric limit; unknown names warn and
    /// return false
    pub async fn set_limit(&self, name: &str, value: Decimal) -> bool {
        self.limits.write().await.set(name, value)
    }

    /// Administrative setter for an adjustment toggle
    pub async fn set_limit_flag(&self, name: &str, value: bool) -> bool {
        self.limits.write().await.set_flag(name, value)
    }

    /// Create a Closed-state breaker keyed by symbol
    pub async fn register_circuit_breaker(&self, symbol: &Symbol) {
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.breaker.clone())));
        debug!("registered circuit breaker for {}", symbol);
    }

    pub async fn breaker_state(&self, symbol: &str) -> Option<CircuitState> {
        let breakers = self.breakers.read().await;
        match breakers.get(symbol) {
            Some(breaker) => Some(breaker.state().await),
            None => None,
        }
    }

    /// Operator override: reset a tripped symbol breaker
    pub async fn reset_breaker(&self, symbol: &str) -> bool {
        let breakers = self.breakers.read().await;
        match breakers.get(symbol) {
            Some(breaker) => {
                breaker.force_reset().await;
                true
            }
            None => false,
        }
    }

    /// Price-feed hook: record the tick and run the symbol breaker's trip
    /// logic (an excessive single-tick move counts as a failure).
    pub async fn on_price(&self, symbol: &Symbol, price: Price) {
        let excessive_move = {
            let mut history = self.price_history.write().await;
            let ticks = history.entry(symbol.clone()).or_default();
            let excessive = ticks.back().is_some_and(|last| {
                !last.is_zero()
                    && ((price.value() - last.value()).abs() / last.value()
                        * Decimal::ONE_HUNDRED)
                        > self.config.max_price_move_pct
            });
            ticks.push_back(price);
            while ticks.len() > self.config.price_history_len {
                ticks.pop_front();
            }
            excessive
        };

        let breakers = self.breakers.read().await;
        if let Some(breaker) = breakers.get(symbol) {
            if excessive_move {
                warn!("excessive price move on {}: {}", symbol, price);
                if breaker.record_failure().await == BreakerSignal::Tripped {
                    self.alerts
                        .emit(
                            AlertLevel::Error,
                            "risk",
                            format!("circuit breaker tripped for {}", symbol),
                        )
                        .await;
                }
            } else {
                // A calm tick is the recovery signal. Once the cool-down has
                // elapsed can_execute promotes Open to HalfOpen, and the
                // success below closes it.
                if breaker.state().await == CircuitState::Open {
                    breaker.can_execute().await;
                }
                breaker.record_success().await;
            }
        }
    }

    /// Validate a proposed order against the current limits.
    ///
    /// Rejection is an expected outcome returned as a value; this never
    /// fails for ordinary limit violations.
    pub async fn validate_order(
        &self,
        order: &NewOrder,
        reference_price: Price,
        account_equity: Price,
    ) -> Result<(), RiskViolation> {
        let limits = self.limits().await;
        let equity = account_equity.value();

        if equity <= Decimal::ZERO {
            return Err(RiskViolation::new(
                "NoEquity",
                format!("account equity {} is not positive", equity),
            ));
        }

        let notional = order.size.value().abs() * reference_price.value();
        let max_notional = equity * limits.max_position_size_pct / Decimal::ONE_HUNDRED;
        if notional > max_notional {
            return Err(RiskViolation::new(
                "MaxPositionSize",
                format!(
                    "order notional {} exceeds {}% of equity ({})",
                    notional, limits.max_position_size_pct, max_notional
                ),
            ));
        }

        let exposure = self.portfolio.total_exposure().await;
        let exposure_limit = equity * limits.max_total_exposure_pct / Decimal::ONE_HUNDRED;
        if exposure + notional > exposure_limit {
            return Err(RiskViolation::new(
                "MaxTotalExposure",
                format!(
                    "projected exposure {} exceeds {}% of equity ({})",
                    exposure + notional,
                    limits.max_total_exposure_pct,
                    exposure_limit
                ),
            ));
        }

        let breakers = self.breakers.read().await;
        if let Some(breaker) = breakers.get(order.symbol.as_str()) {
            // Past the cool-down this admits the order as the breaker's
            // trial; the next calm tick then closes it
            if !breaker.can_execute().await {
                return Err(RiskViolation::new(
                    "CircuitBreakerOpen",
                    format!("circuit breaker open for {}", order.symbol),
                ));
            }
        }

        Ok(())
    }

    /// Realized volatility for a symbol: standard deviation of tick-to-tick
    /// percent returns over the retained history
    pub async fn realized_volatility_pct(&self, symbol: &str) -> Option<f64> {
        let history = self.price_history.read().await;
        let ticks = history.get(symbol)?;
        if ticks.len() < 3 {
            return None;
        }

        let prices: Vec<f64> = ticks.iter().filter_map(|p| p.value().to_f64()).collect();
        let returns: Vec<f64> = prices
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0] * 100.0)
            .collect();
        if returns.len() < 2 {
            return None;
        }

        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let variance =
            returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
        Some(variance.sqrt())
    }

    /// Dynamic position size in base units.
    ///
    /// Base notional = equity x risk_pct / stop_loss_pct. Enabled
    /// adjustments apply as independent multiplicative factors, in the fixed
    /// order volatility, drawdown, correlation; the result is clamped to
    /// [0, max_position_size_pct x equity] and converted at the latest
    /// observed price.
    pub async fn calculate_position_size(
        &self,
        symbol: &str,
        account_equity: Price,
        risk_pct: Option<Decimal>,
        stop_loss_pct: Option<Decimal>,
    ) -> Size {
        let limits = self.limits().await;
        let equity = account_equity.value();
        let risk = risk_pct.unwrap_or(limits.default_risk_pct);
        let stop = stop_loss_pct.unwrap_or(limits.default_stop_loss_pct);
        if equity <= Decimal::ZERO || risk <= Decimal::ZERO || stop <= Decimal::ZERO {
            return Size::ZERO;
        }

        let mut notional = equity * risk / stop;

        if limits.volatility_adjustment {
            if let Some(vol) = self.realized_volatility_pct(symbol).await {
                if vol > self.config.reference_volatility_pct {
                    let factor = self.config.reference_volatility_pct / vol;
                    let factor = Decimal::from_f64(factor).unwrap_or(Decimal::ONE);
                    notional *= factor;
                }
            }
        }

        if limits.drawdown_adjustment && limits.max_drawdown_pct > Decimal::ZERO {
            let drawdown = self.portfolio.drawdown_pct().await;
            let remaining = (Decimal::ONE - drawdown / limits.max_drawdown_pct)
                .clamp(Decimal::ZERO, Decimal::ONE);
            notional *= remaining;
        }

        if limits.correlation_adjustment {
            // Exposure already held elsewhere counts against the new trade
            let exposure_limit = equity * limits.max_total_exposure_pct / Decimal::ONE_HUNDRED;
            if exposure_limit > Decimal::ZERO {
                let held: Decimal = self
                    .portfolio
                    .positions()
                    .await
                    .iter()
                    .filter(|p| p.symbol.as_str() != symbol)
                    .map(|p| p.notional())
                    .sum();
                let crowding = (held / exposure_limit).min(Decimal::ONE);
                notional *= Decimal::ONE - crowding / Decimal::TWO;
            }
        }

        let cap = equity * limits.max_position_size_pct / Decimal::ONE_HUNDRED;
        notional = notional.clamp(Decimal::ZERO, cap);

        let latest_price = {
            let history = self.price_history.read().await;
            history.get(symbol).and_then(|t| t.back().copied())
        };
        match latest_price {
            Some(price) if !price.is_zero() => Size::new(notional / price.value()),
            _ => {
                warn!("no price observed for {}, position size unavailable", symbol);
                Size::ZERO
            }
        }
    }

    /// Read-only snapshot of breaker states, exposure and drawdown.
    /// Must not mutate any breaker.
    pub async fn risk_report(&self) -> RiskReport {
        let limits = self.limits().await;
        let equity = self.portfolio.account_equity().await.value();
        let exposure = self.portfolio.total_exposure().await;
        let drawdown = self.portfolio.drawdown_pct().await;

        let mut breaker_states = HashMap::new();
        let breakers = self.breakers.read().await;
        for (symbol, breaker) in breakers.iter() {
            breaker_states.insert(symbol.clone(), breaker.state().await);
        }

        RiskReport {
            breaker_states,
            total_exposure: exposure,
            exposure_limit: equity * limits.max_total_exposure_pct / Decimal::ONE_HUNDRED,
            drawdown_pct: drawdown,
            limits,
            generated_at: Utc::now(),
        }
    }
}
