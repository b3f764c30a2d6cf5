pub mod alerts;
pub mod metrics;

pub use alerts::{Alert, AlertLevel, AlertManager};
pub use metrics::{Metric, MetricValue, MetricsCollector};
