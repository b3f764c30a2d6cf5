pub mod limits;
pub mod manager;

pub use limits::RiskLimits;
pub use manager::{RiskConfig, RiskManager, RiskReport};
