use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account risk limits.
///
/// Mutated only through the named setters, which reject unknown names with a
/// warning; readers get immutable snapshots, never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Largest single order, as a percentage of account equity
    pub max_position_size_pct: Decimal,
    /// Cap on gross exposure across open positions, pct of equity
    pub max_total_exposure_pct: Decimal,
    /// Drawdown level treated as the account's hard limit
    pub max_drawdown_pct: Decimal,
    pub default_stop_loss_pct: Decimal,
    pub default_take_profit_pct: Decimal,
    /// Equity share risked per trade when the caller does not specify one
    pub default_risk_pct: Decimal,
    pub volatility_adjustment: bool,
    pub drawdown_adjustment: bool,
    pub correlation_adjustment: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size_pct: Decimal::new(10, 0),
            max_total_exposure_pct: Decimal::new(50, 0),
            max_drawdown_pct: Decimal::new(20, 0),
            default_stop_loss_pct: Decimal::new(2, 0),
            default_take_profit_pct: Decimal::new(4, 0),
            default_risk_pct: Decimal::new(1, 0),
            volatility_adjustment: true,
            drawdown_adjustment: true,
            correlation_adjustment: false,
        }
    }
}

impl RiskLimits {
    /// Set a numeric limit by name. Unknown names are rejected with a
    /// warning and `false`; they are not an error.
    pub fn set(&mut self, name: &str, value: Decimal) -> bool {
        match name {
            "max_position_size_pct" => self.max_position_size_pct = value,
            "max_total_exposure_pct" => self.max_total_exposure_pct = value,
            "max_drawdown_pct" => self.max_drawdown_pct = value,
            "default_stop_loss_pct" => self.default_stop_loss_pct = value,
            "default_take_profit_pct" => self.default_take_profit_pct = value,
            "default_risk_pct" => self.default_risk_pct = value,
            _ => {
                warn!("ignoring unknown risk limit '{}'", name);
                return false;
            }
        }
        true
    }

    /// Set a position-sizing adjustment toggle by name
    pub fn set_flag(&mut self, name: &str, value: bool) -> bool {
        match name {
            "volatility_adjustment" => self.volatility_adjustment = value,
            "drawdown_adjustment" => self.drawdown_adjustment = value,
            "correlation_adjustment" => self.correlation_adjustment = value,
            _ => {
                warn!("ignoring unknown risk flag '{}'", name);
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_known_limit() {
        let mut limits = RiskLimits::default();
        assert!(limits.set("max_position_size_pct", Decimal::new(5, 0)));
        assert_eq!(limits.max_position_size_pct, Decimal::new(5, 0));
    }

    #[test]
    fn test_set_unknown_name_rejected_without_change() {
        let mut limits = RiskLimits::default();
        let before = limits.clone();
        assert!(!limits.set("max_leverage", Decimal::new(100, 0)));
        assert!(!limits.set_flag("moon_mode", true));
        assert_eq!(limits, before);
    }

    #[test]
    fn test_set_flags() {
        let mut limits = RiskLimits::default();
        assert!(limits.set_flag("correlation_adjustment", true));
        assert!(limits.correlation_adjustment);
        assert!(limits.set_flag("volatility_adjustment", false));
        assert!(!limits.volatility_adjustment);
    }
}
