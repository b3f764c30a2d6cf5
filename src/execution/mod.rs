pub mod executor;

pub use executor::{ExecutionError, ExecutionStats, ExecutorConfig, ReliableOrderExecutor};
